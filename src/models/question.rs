use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default = "default_marks")]
    pub marks: i32,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

fn default_marks() -> i32 {
    1
}

impl Question {
    /// Stable id used everywhere a question is addressed (answers, grading,
    /// the public view). Authored ids are kept as-is; only a missing id
    /// (zero from `serde(default)`) falls back to the 1-based position.
    pub fn effective_id(&self, idx: usize) -> i32 {
        if self.id > 0 {
            self.id
        } else {
            idx as i32 + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Objective: auto-graded against a correct option index.
    MultipleChoice,
    /// Free-response: always requires manual grading.
    Essay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(untagged)]
pub enum QuestionDetails {
    MultipleChoice(MultipleChoiceDetails),
    Essay(EssayDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleChoiceDetails {
    pub options: Vec<String>,
    pub correct_option: i32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayDetails {
    pub guidelines: Option<String>,
    pub min_words: Option<i32>,
    #[serde(default)]
    pub allow_attachments: bool,
}
