use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAttemptsQuery {
    pub test_id: uuid::Uuid,
    pub student_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradeEssayRequest {
    pub question_id: i32,
    #[validate(range(min = 0))]
    pub marks_awarded: i32,
    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
    pub graded_by: uuid::Uuid,
}
