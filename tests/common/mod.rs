use assessment_backend::config::IntegrityThresholds;
use assessment_backend::models::question::{
    EssayDetails, MultipleChoiceDetails, Question, QuestionDetails, QuestionType,
};
use assessment_backend::models::test::Test;
use assessment_backend::stores::memory::{
    MemoryAttemptStore, MemorySessionStore, MemorySubmissionStore, MemoryTestSource,
};
use assessment_backend::utils::time::ManualClock;
use assessment_backend::AppState;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub tests: Arc<MemoryTestSource>,
    pub sessions: Arc<MemorySessionStore>,
}

/// Memory-backed application state with a manually driven clock.
pub fn harness_with_sync(heartbeat_sync_secs: i64) -> Harness {
    let attempts = Arc::new(MemoryAttemptStore::new());
    let submissions = Arc::new(MemorySubmissionStore::new());
    let tests = Arc::new(MemoryTestSource::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let clock = Arc::new(ManualClock::new(t0()));

    let state = AppState::new(
        attempts,
        submissions,
        tests.clone(),
        sessions.clone(),
        clock.clone(),
        heartbeat_sync_secs,
        IntegrityThresholds::default(),
    );

    Harness {
        state,
        clock,
        tests,
        sessions,
    }
}

pub fn harness() -> Harness {
    harness_with_sync(0)
}

pub fn mcq(id: i32, marks: i32, correct_option: i32) -> Question {
    Question {
        id,
        question_type: QuestionType::MultipleChoice,
        question: format!("Question {}", id),
        marks,
        details: QuestionDetails::MultipleChoice(MultipleChoiceDetails {
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option,
            explanation: None,
        }),
    }
}

pub fn essay(id: i32, marks: i32) -> Question {
    Question {
        id,
        question_type: QuestionType::Essay,
        question: format!("Question {}", id),
        marks,
        details: QuestionDetails::Essay(EssayDetails {
            guidelines: Some("Answer in full sentences.".into()),
            min_words: None,
            allow_attachments: false,
        }),
    }
}

pub fn sample_test(duration_minutes: i32, attempts_allowed: i32, questions: Vec<Question>) -> Test {
    Test {
        id: Uuid::new_v4(),
        title: "Sample Test".into(),
        description: None,
        questions,
        duration_minutes,
        passing_score: 50.0,
        attempts_allowed,
        available_from: None,
        available_until: None,
        is_active: true,
        created_at: Some(t0()),
        updated_at: Some(t0()),
    }
}
