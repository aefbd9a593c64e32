use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::question::{Question, QuestionDetails, QuestionType};
use crate::models::session::{AnswerPayload, SuspiciousKind};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAttemptRequest {
    pub test_id: uuid::Uuid,
    pub student_id: uuid::Uuid,
    #[validate(length(min = 1, max = 200))]
    pub student_name: String,
    pub class_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub id: uuid::Uuid,
    pub test_id: uuid::Uuid,
    pub student_id: uuid::Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time_ceiling: Option<chrono::DateTime<chrono::Utc>>,
    pub total_time_allowed: i64,
    pub time_spent: i64,
    pub time_remaining: i64,
}

impl From<&Attempt> for AttemptSummary {
    fn from(a: &Attempt) -> Self {
        Self {
            id: a.id,
            test_id: a.test_id,
            student_id: a.student_id,
            attempt_number: a.attempt_number,
            status: a.status,
            started_at: a.started_at,
            end_time_ceiling: a.end_time_ceiling,
            total_time_allowed: a.total_time_allowed,
            time_spent: a.time_spent,
            time_remaining: a.time_remaining,
        }
    }
}

/// Question as exposed to the student: no correct answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    pub marks: i32,
    pub options: Option<Vec<String>>,
    pub guidelines: Option<String>,
}

impl PublicQuestion {
    pub fn from_question(q: &Question, idx: usize) -> Self {
        let (options, guidelines) = match &q.details {
            QuestionDetails::MultipleChoice(mc) => (Some(mc.options.clone()), None),
            QuestionDetails::Essay(e) => (None, e.guidelines.clone()),
        };
        Self {
            id: q.effective_id(idx),
            question_type: q.question_type,
            question: q.question.clone(),
            marks: q.marks,
            options,
            guidelines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt: AttemptSummary,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: i32,
    pub answer: AnswerPayload,
    #[validate(range(min = 0))]
    pub time_spent_seconds: i32,
    pub marked_for_review: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: i32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateRequest {
    pub question_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewMarkRequest {
    pub question_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewMarkResponse {
    pub question_id: i32,
    pub marked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRequest {
    pub kind: SuspiciousKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub kind: SuspiciousKind,
    pub count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub time_spent: i64,
    pub time_remaining: i64,
    pub is_expired: bool,
    pub offline_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: AttemptStatus,
    pub time_spent: i64,
    pub time_remaining: i64,
    pub is_expired: bool,
    pub questions_answered: Option<i32>,
    pub total_questions: Option<i32>,
    pub current_question_index: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Set by the driver when submission was triggered by expiry rather
    /// than student action.
    pub is_auto_submitted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub attempt_id: uuid::Uuid,
    pub auto_graded_score: i32,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub pass_status: crate::models::submission::PassStatus,
    pub manual_grading_pending: bool,
    pub is_auto_submitted: bool,
    pub message: String,
}
