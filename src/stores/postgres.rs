use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptStatus, ConnectionEvent};
use crate::models::question::Question;
use crate::models::submission::{FinalAnswer, IntegrityReport, PassStatus, Submission};
use crate::models::test::Test;
use crate::stores::{AttemptStore, SubmissionStore, TestSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Durable attempt store on Postgres. Embedded documents (connection events,
/// final answers, integrity report, questions) live in JSONB columns.
#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    test_id: Uuid,
    student_id: Uuid,
    student_name: String,
    class_id: Option<Uuid>,
    attempt_number: i32,
    status: String,
    started_at: Option<DateTime<Utc>>,
    end_time_ceiling: Option<DateTime<Utc>>,
    total_time_allowed: i64,
    time_spent: i64,
    time_remaining: i64,
    connection_events: JsonValue,
    suspicious_activity_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AttemptRow {
    fn into_attempt(self) -> Result<Attempt> {
        let status: AttemptStatus = self
            .status
            .parse()
            .map_err(Error::Internal)?;
        let connection_events: Vec<ConnectionEvent> =
            serde_json::from_value(self.connection_events)?;
        Ok(Attempt {
            id: self.id,
            test_id: self.test_id,
            student_id: self.student_id,
            student_name: self.student_name,
            class_id: self.class_id,
            attempt_number: self.attempt_number,
            status,
            started_at: self.started_at,
            end_time_ceiling: self.end_time_ceiling,
            total_time_allowed: self.total_time_allowed,
            time_spent: self.time_spent,
            time_remaining: self.time_remaining,
            connection_events,
            suspicious_activity_count: self.suspicious_activity_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn create(&self, attempt: &Attempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, test_id, student_id, student_name, class_id, attempt_number,
                status, started_at, end_time_ceiling, total_time_allowed,
                time_spent, time_remaining, connection_events,
                suspicious_activity_count, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.test_id)
        .bind(attempt.student_id)
        .bind(&attempt.student_name)
        .bind(attempt.class_id)
        .bind(attempt.attempt_number)
        .bind(attempt.status.as_str())
        .bind(attempt.started_at)
        .bind(attempt.end_time_ceiling)
        .bind(attempt.total_time_allowed)
        .bind(attempt.time_spent)
        .bind(attempt.time_remaining)
        .bind(serde_json::to_value(&attempt.connection_events)?)
        .bind(attempt.suspicious_activity_count)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(r#"SELECT * FROM attempts WHERE id = $1"#)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttemptRow::into_attempt).transpose()
    }

    async fn update(&self, attempt: &Attempt) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE attempts
            SET status = $2, started_at = $3, end_time_ceiling = $4,
                time_spent = $5, time_remaining = $6, connection_events = $7,
                suspicious_activity_count = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(attempt.started_at)
        .bind(attempt.end_time_ceiling)
        .bind(attempt.time_spent)
        .bind(attempt.time_remaining)
        .bind(serde_json::to_value(&attempt.connection_events)?)
        .bind(attempt.suspicious_activity_count)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM attempts
            WHERE test_id = $1 AND student_id = $2
            ORDER BY attempt_number DESC
            "#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }

    async fn list_by_status(&self, statuses: &[AttemptStatus]) -> Result<Vec<Attempt>> {
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"SELECT * FROM attempts WHERE status = ANY($1)"#,
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }
}

#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SubmissionRow {
    attempt_id: Uuid,
    test_id: Uuid,
    test_title: String,
    student_id: Uuid,
    student_name: String,
    attempt_number: i32,
    start_time: Option<DateTime<Utc>>,
    end_time: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    is_auto_submitted: bool,
    total_time_spent: i64,
    final_answers: JsonValue,
    auto_graded_score: i32,
    total_score: i32,
    max_score: i32,
    percentage: f64,
    pass_status: String,
    manual_grading_pending: bool,
    questions_attempted: i32,
    questions_skipped: i32,
    integrity_report: JsonValue,
    version: i64,
}

impl SubmissionRow {
    fn into_submission(self) -> Result<Submission> {
        let final_answers: Vec<FinalAnswer> = serde_json::from_value(self.final_answers)?;
        let integrity_report: IntegrityReport = serde_json::from_value(self.integrity_report)?;
        let pass_status = match self.pass_status.as_str() {
            "passed" => PassStatus::Passed,
            "failed" => PassStatus::Failed,
            "pending_review" => PassStatus::PendingReview,
            other => return Err(Error::Internal(format!("unknown pass status: {}", other))),
        };
        Ok(Submission {
            attempt_id: self.attempt_id,
            test_id: self.test_id,
            test_title: self.test_title,
            student_id: self.student_id,
            student_name: self.student_name,
            attempt_number: self.attempt_number,
            start_time: self.start_time,
            end_time: self.end_time,
            submitted_at: self.submitted_at,
            is_auto_submitted: self.is_auto_submitted,
            total_time_spent: self.total_time_spent,
            final_answers,
            auto_graded_score: self.auto_graded_score,
            total_score: self.total_score,
            max_score: self.max_score,
            percentage: self.percentage,
            pass_status,
            manual_grading_pending: self.manual_grading_pending,
            questions_attempted: self.questions_attempted,
            questions_skipped: self.questions_skipped,
            integrity_report,
            version: self.version,
        })
    }
}

fn pass_status_str(status: PassStatus) -> &'static str {
    match status {
        PassStatus::Passed => "passed",
        PassStatus::Failed => "failed",
        PassStatus::PendingReview => "pending_review",
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create_if_absent(&self, submission: &Submission) -> Result<Submission> {
        sqlx::query(
            r#"
            INSERT INTO submissions (
                attempt_id, test_id, test_title, student_id, student_name,
                attempt_number, start_time, end_time, submitted_at,
                is_auto_submitted, total_time_spent, final_answers,
                auto_graded_score, total_score, max_score, percentage,
                pass_status, manual_grading_pending, questions_attempted,
                questions_skipped, integrity_report, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                      $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (attempt_id) DO NOTHING
            "#,
        )
        .bind(submission.attempt_id)
        .bind(submission.test_id)
        .bind(&submission.test_title)
        .bind(submission.student_id)
        .bind(&submission.student_name)
        .bind(submission.attempt_number)
        .bind(submission.start_time)
        .bind(submission.end_time)
        .bind(submission.submitted_at)
        .bind(submission.is_auto_submitted)
        .bind(submission.total_time_spent)
        .bind(serde_json::to_value(&submission.final_answers)?)
        .bind(submission.auto_graded_score)
        .bind(submission.total_score)
        .bind(submission.max_score)
        .bind(submission.percentage)
        .bind(pass_status_str(submission.pass_status))
        .bind(submission.manual_grading_pending)
        .bind(submission.questions_attempted)
        .bind(submission.questions_skipped)
        .bind(serde_json::to_value(&submission.integrity_report)?)
        .bind(submission.version)
        .execute(&self.pool)
        .await?;

        let stored = self
            .get(submission.attempt_id)
            .await?
            .ok_or_else(|| Error::SubmissionNotFound(submission.attempt_id))?;
        Ok(stored)
    }

    async fn get(&self, attempt_id: Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"SELECT * FROM submissions WHERE attempt_id = $1"#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SubmissionRow::into_submission).transpose()
    }

    async fn update_if_version(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET final_answers = $2, total_score = $3, percentage = $4,
                pass_status = $5, manual_grading_pending = $6, version = $7
            WHERE attempt_id = $1 AND version = $8
            "#,
        )
        .bind(submission.attempt_id)
        .bind(serde_json::to_value(&submission.final_answers)?)
        .bind(submission.total_score)
        .bind(submission.percentage)
        .bind(pass_status_str(submission.pass_status))
        .bind(submission.manual_grading_pending)
        .bind(expected_version + 1)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PgTestSource {
    pool: PgPool,
}

impl PgTestSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TestRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    questions: JsonValue,
    duration_minutes: i32,
    passing_score: f64,
    attempts_allowed: i32,
    available_from: Option<DateTime<Utc>>,
    available_until: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl TestSource for PgTestSource {
    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        let row = sqlx::query_as::<_, TestRow>(r#"SELECT * FROM tests WHERE id = $1"#)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let questions: Vec<Question> = serde_json::from_value(row.questions)?;
                Ok(Some(Test {
                    id: row.id,
                    title: row.title,
                    description: row.description,
                    questions,
                    duration_minutes: row.duration_minutes,
                    passing_score: row.passing_score,
                    attempts_allowed: row.attempts_allowed,
                    available_from: row.available_from,
                    available_until: row.available_until,
                    is_active: row.is_active,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                }))
            }
            None => Ok(None),
        }
    }
}
