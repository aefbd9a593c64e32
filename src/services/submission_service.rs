use crate::config::IntegrityThresholds;
use crate::error::{Error, Result};
use crate::models::question::QuestionType;
use crate::models::submission::Submission;
use crate::services::grading_service::GradingService;
use crate::services::session_service::SessionService;
use crate::stores::{AttemptStore, SubmissionStore, TestSource};
use crate::utils::time::Clock;
use std::sync::Arc;
use uuid::Uuid;

const GRADE_RETRY_LIMIT: usize = 5;

/// Converts the final ephemeral session plus the test definition into one
/// immutable, gradable submission record, exactly once per attempt.
#[derive(Clone)]
pub struct SubmissionService {
    attempts: Arc<dyn AttemptStore>,
    submissions: Arc<dyn SubmissionStore>,
    tests: Arc<dyn TestSource>,
    session_service: SessionService,
    clock: Arc<dyn Clock>,
    thresholds: IntegrityThresholds,
}

impl SubmissionService {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        submissions: Arc<dyn SubmissionStore>,
        tests: Arc<dyn TestSource>,
        session_service: SessionService,
        clock: Arc<dyn Clock>,
        thresholds: IntegrityThresholds,
    ) -> Self {
        Self {
            attempts,
            submissions,
            tests,
            session_service,
            clock,
            thresholds,
        }
    }

    pub async fn get_submission(&self, attempt_id: Uuid) -> Result<Submission> {
        self.submissions
            .get(attempt_id)
            .await?
            .ok_or(Error::SubmissionNotFound(attempt_id))
    }

    /// Grades the attempt's final session and writes the submission.
    /// Idempotent: when a submission already exists it is returned as-is,
    /// so retries and duplicate submit calls can never produce a second
    /// record. `SessionNotFound` is fatal here — with the session gone there
    /// is nothing left to grade.
    pub async fn process_submission(
        &self,
        attempt_id: Uuid,
        is_auto_submitted: bool,
    ) -> Result<Submission> {
        if let Some(existing) = self.submissions.get(attempt_id).await? {
            return Ok(existing);
        }

        let attempt = self
            .attempts
            .get(attempt_id)
            .await?
            .ok_or(Error::AttemptNotFound(attempt_id))?;
        let session = self
            .session_service
            .get_session(attempt_id)
            .await?
            .ok_or(Error::SessionNotFound(attempt_id))?;
        let test = self
            .tests
            .get_test(attempt.test_id)
            .await?
            .ok_or(Error::TestNotFound(attempt.test_id))?;

        let graded = GradingService::grade(&test.questions, &session.answers);
        let integrity_report = GradingService::integrity_report(&session, &self.thresholds);

        let now = self.clock.now();
        let percentage = if graded.max_score > 0 {
            (graded.auto_graded_score as f64 / graded.max_score as f64 * 100.0).round()
        } else {
            0.0
        };
        let pass_status = if graded.manual_grading_pending {
            crate::models::submission::PassStatus::PendingReview
        } else if percentage >= test.passing_score {
            crate::models::submission::PassStatus::Passed
        } else {
            crate::models::submission::PassStatus::Failed
        };

        let submission = Submission {
            attempt_id,
            test_id: test.id,
            test_title: test.title.clone(),
            student_id: attempt.student_id,
            student_name: attempt.student_name.clone(),
            attempt_number: attempt.attempt_number,
            start_time: attempt.started_at,
            end_time: now,
            submitted_at: now,
            is_auto_submitted,
            total_time_spent: attempt.time_spent,
            final_answers: graded.final_answers,
            auto_graded_score: graded.auto_graded_score,
            total_score: graded.auto_graded_score,
            max_score: graded.max_score,
            percentage,
            pass_status,
            manual_grading_pending: graded.manual_grading_pending,
            questions_attempted: graded.questions_attempted,
            questions_skipped: graded.questions_skipped,
            integrity_report,
            version: 1,
        };

        let stored = self.submissions.create_if_absent(&submission).await?;
        // The session's lifetime ends here; archival is only reached after
        // the durable record exists.
        self.session_service.archive_session(attempt_id).await?;

        tracing::info!(
            attempt_id = %attempt_id,
            score = stored.auto_graded_score,
            max_score = stored.max_score,
            percentage = stored.percentage,
            manual_grading_pending = stored.manual_grading_pending,
            "submission processed"
        );
        Ok(stored)
    }

    /// Manual essay grading: the only allowed post-creation mutation of a
    /// submission. Applied as a version-guarded read-modify-write so
    /// concurrent reviewers cannot lose each other's updates.
    pub async fn grade_essay_question(
        &self,
        attempt_id: Uuid,
        question_id: i32,
        marks_awarded: i32,
        feedback: Option<String>,
        graded_by: Uuid,
    ) -> Result<Submission> {
        for _ in 0..GRADE_RETRY_LIMIT {
            let mut submission = self.get_submission(attempt_id).await?;
            let expected_version = submission.version;

            let test = self
                .tests
                .get_test(submission.test_id)
                .await?
                .ok_or(Error::TestNotFound(submission.test_id))?;

            let entry = submission
                .final_answers
                .iter_mut()
                .find(|a| a.question_id == question_id)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "question {} not found in submission",
                        question_id
                    ))
                })?;
            if entry.question_type != QuestionType::Essay {
                return Err(Error::Validation(format!(
                    "question {} is not a free-response question",
                    question_id
                )));
            }
            if marks_awarded < 0 || marks_awarded > entry.max_marks {
                return Err(Error::Validation(format!(
                    "marks must be between 0 and {}",
                    entry.max_marks
                )));
            }

            entry.marks_awarded = Some(marks_awarded);
            entry.graded_by = Some(graded_by);
            entry.graded_at = Some(self.clock.now());
            entry.feedback = feedback.clone();

            submission.recompute_totals(test.passing_score);

            if self
                .submissions
                .update_if_version(&submission, expected_version)
                .await?
            {
                submission.version = expected_version + 1;
                tracing::info!(
                    attempt_id = %attempt_id,
                    question_id,
                    marks_awarded,
                    manual_grading_pending = submission.manual_grading_pending,
                    "essay question graded"
                );
                return Ok(submission);
            }
            // Another reviewer updated the record first; re-read and retry.
        }
        Err(Error::Internal(
            "could not apply essay grade after repeated version conflicts".into(),
        ))
    }
}
