use crate::models::question::QuestionType;
use crate::models::session::SuspiciousEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Passed,
    Failed,
    PendingReview,
}

/// One entry per test question, answered or not. Unanswered questions carry
/// `answer: None` and zero marks so the entry count always equals the
/// question count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub question_id: i32,
    pub question_text: String,
    pub question_type: QuestionType,
    pub answer: Option<JsonValue>,
    pub correct_answer: Option<JsonValue>,
    pub is_correct: Option<bool>,
    pub marks_awarded: Option<i32>,
    pub max_marks: i32,
    pub needs_manual_grading: bool,
    pub time_spent_seconds: i32,
    pub answer_change_count: i32,
    pub graded_by: Option<Uuid>,
    pub graded_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
}

impl FinalAnswer {
    pub fn was_answered(&self) -> bool {
        self.answer.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub tab_switches: i32,
    pub copy_paste_attempts: i32,
    pub right_clicks: i32,
    pub keyboard_shortcuts: i32,
    pub disconnections: i32,
    pub suspicious_activities: Vec<SuspiciousEvent>,
    pub is_integrity_compromised: bool,
    pub notes: Vec<String>,
}

/// Immutable gradable record, exactly one per attempt. The only allowed
/// post-creation mutation is manual essay grading, applied as a
/// version-guarded read-modify-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub test_title: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub attempt_number: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub is_auto_submitted: bool,
    pub total_time_spent: i64,
    pub final_answers: Vec<FinalAnswer>,
    pub auto_graded_score: i32,
    /// auto_graded_score plus manually awarded essay marks.
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub pass_status: PassStatus,
    pub manual_grading_pending: bool,
    pub questions_attempted: i32,
    pub questions_skipped: i32,
    pub integrity_report: IntegrityReport,
    /// Optimistic-concurrency guard for manual grading.
    pub version: i64,
}

impl Submission {
    pub fn recompute_totals(&mut self, passing_score: f64) {
        self.total_score = self
            .final_answers
            .iter()
            .filter_map(|a| a.marks_awarded)
            .sum();
        self.percentage = if self.max_score > 0 {
            (self.total_score as f64 / self.max_score as f64 * 100.0).round()
        } else {
            0.0
        };
        self.manual_grading_pending = self
            .final_answers
            .iter()
            .any(|a| a.needs_manual_grading && a.graded_at.is_none());
        self.pass_status = if self.manual_grading_pending {
            PassStatus::PendingReview
        } else if self.percentage >= passing_score {
            PassStatus::Passed
        } else {
            PassStatus::Failed
        };
    }
}
