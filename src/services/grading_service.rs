use crate::config::IntegrityThresholds;
use crate::models::question::{Question, QuestionDetails, QuestionType};
use crate::models::session::{AnswerPayload, AnswerRecord, EphemeralSession};
use crate::models::submission::{FinalAnswer, IntegrityReport};
use std::collections::HashMap;

#[derive(Debug)]
pub struct GradedAnswers {
    pub final_answers: Vec<FinalAnswer>,
    pub auto_graded_score: i32,
    pub max_score: i32,
    pub manual_grading_pending: bool,
    pub questions_attempted: i32,
    pub questions_skipped: i32,
}

pub struct GradingService;

impl GradingService {
    /// Builds exactly one FinalAnswer per test question. Objective questions
    /// are graded immediately; free-response answers are flagged for manual
    /// grading; unanswered questions get a zero-mark entry rather than being
    /// omitted, so the entry count always equals the question count.
    pub fn grade(questions: &[Question], answers: &HashMap<i32, AnswerRecord>) -> GradedAnswers {
        let mut final_answers = Vec::with_capacity(questions.len());
        let mut auto_graded_score = 0;
        let mut max_score = 0;
        let mut manual_grading_pending = false;
        let mut questions_attempted = 0;

        for (idx, q) in questions.iter().enumerate() {
            max_score += q.marks;
            let question_id = q.effective_id(idx);
            let answer = answers.get(&question_id);

            let mut entry = FinalAnswer {
                question_id,
                question_text: q.question.clone(),
                question_type: q.question_type,
                answer: answer.map(|a| a.payload.to_json()),
                correct_answer: None,
                is_correct: None,
                marks_awarded: Some(0),
                max_marks: q.marks,
                needs_manual_grading: false,
                time_spent_seconds: answer.map(|a| a.time_spent_seconds).unwrap_or(0),
                answer_change_count: answer.map(|a| a.change_history.len() as i32).unwrap_or(0),
                graded_by: None,
                graded_at: None,
                feedback: None,
            };

            match (&q.question_type, &q.details) {
                (QuestionType::MultipleChoice, QuestionDetails::MultipleChoice(mc)) => {
                    entry.correct_answer = mc
                        .options
                        .get(mc.correct_option as usize)
                        .map(|opt| serde_json::json!(opt));
                    if let Some(AnswerPayload::Selected { selected_option }) =
                        answer.map(|a| &a.payload)
                    {
                        questions_attempted += 1;
                        let is_correct = *selected_option == mc.correct_option;
                        entry.is_correct = Some(is_correct);
                        let awarded = if is_correct { q.marks } else { 0 };
                        entry.marks_awarded = Some(awarded);
                        auto_graded_score += awarded;
                    } else if answer.is_some() {
                        // Wrong payload shape for the question type counts as
                        // attempted but earns nothing.
                        questions_attempted += 1;
                        entry.is_correct = Some(false);
                    }
                }
                (QuestionType::Essay, _) => {
                    // Free-response questions always await a human, answered
                    // or not; a reviewer scores the blank as zero.
                    if answer.is_some() {
                        questions_attempted += 1;
                    }
                    entry.needs_manual_grading = true;
                    entry.marks_awarded = None;
                    manual_grading_pending = true;
                }
                _ => {
                    if answer.is_some() {
                        questions_attempted += 1;
                    }
                }
            }

            final_answers.push(entry);
        }

        let questions_skipped = questions.len() as i32 - questions_attempted;
        GradedAnswers {
            final_answers,
            auto_graded_score,
            max_score,
            manual_grading_pending,
            questions_attempted,
            questions_skipped,
        }
    }

    pub fn integrity_report(
        session: &EphemeralSession,
        thresholds: &IntegrityThresholds,
    ) -> IntegrityReport {
        let mut notes = Vec::new();
        if session.tab_switch_count > thresholds.max_tab_switches {
            notes.push(format!(
                "tab switches ({}) exceeded threshold ({})",
                session.tab_switch_count, thresholds.max_tab_switches
            ));
        }
        if session.copy_paste_count > thresholds.max_copy_paste {
            notes.push(format!(
                "copy/paste attempts ({}) exceeded threshold ({})",
                session.copy_paste_count, thresholds.max_copy_paste
            ));
        }
        if session.disconnection_count > thresholds.max_disconnections {
            notes.push(format!(
                "disconnections ({}) exceeded threshold ({})",
                session.disconnection_count, thresholds.max_disconnections
            ));
        }

        IntegrityReport {
            tab_switches: session.tab_switch_count,
            copy_paste_attempts: session.copy_paste_count,
            right_clicks: session.right_click_count,
            keyboard_shortcuts: session.keyboard_shortcut_count,
            disconnections: session.disconnection_count,
            suspicious_activities: session.suspicious_events.clone(),
            is_integrity_compromised: !notes.is_empty(),
            notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{EssayDetails, MultipleChoiceDetails};
    use crate::models::session::AnswerChange;
    use chrono::Utc;
    use uuid::Uuid;

    fn mcq(id: i32, marks: i32, correct: i32) -> Question {
        Question {
            id,
            question_type: QuestionType::MultipleChoice,
            question: format!("Q{}", id),
            marks,
            details: QuestionDetails::MultipleChoice(MultipleChoiceDetails {
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option: correct,
                explanation: None,
            }),
        }
    }

    fn essay(id: i32, marks: i32) -> Question {
        Question {
            id,
            question_type: QuestionType::Essay,
            question: format!("Q{}", id),
            marks,
            details: QuestionDetails::Essay(EssayDetails {
                guidelines: None,
                min_words: None,
                allow_attachments: false,
            }),
        }
    }

    fn selected(question_id: i32, option: i32) -> AnswerRecord {
        AnswerRecord {
            question_id,
            payload: AnswerPayload::Selected {
                selected_option: option,
            },
            last_modified: Utc::now(),
            time_spent_seconds: 10,
            is_marked_for_review: false,
            change_history: vec![AnswerChange {
                timestamp: Utc::now(),
                previous_value: None,
                new_value: serde_json::json!({ "selected_option": option }),
                time_on_question: 10,
            }],
        }
    }

    #[test]
    fn correct_option_earns_full_marks() {
        let questions = vec![mcq(1, 10, 1)];
        let mut answers = HashMap::new();
        answers.insert(1, selected(1, 1));
        let graded = GradingService::grade(&questions, &answers);
        assert_eq!(graded.auto_graded_score, 10);
        assert_eq!(graded.max_score, 10);
        assert_eq!(graded.final_answers[0].is_correct, Some(true));
        assert!(!graded.manual_grading_pending);
    }

    #[test]
    fn wrong_option_earns_nothing() {
        let questions = vec![mcq(1, 10, 1)];
        let mut answers = HashMap::new();
        answers.insert(1, selected(1, 0));
        let graded = GradingService::grade(&questions, &answers);
        assert_eq!(graded.auto_graded_score, 0);
        assert_eq!(graded.final_answers[0].is_correct, Some(false));
        assert_eq!(graded.final_answers[0].marks_awarded, Some(0));
    }

    #[test]
    fn unanswered_questions_still_get_entries() {
        let questions = vec![mcq(1, 2, 0), mcq(2, 2, 1), mcq(3, 2, 2), mcq(4, 2, 3), mcq(5, 2, 0)];
        let mut answers = HashMap::new();
        answers.insert(1, selected(1, 0));
        answers.insert(3, selected(3, 2));
        answers.insert(5, selected(5, 1));
        let graded = GradingService::grade(&questions, &answers);
        assert_eq!(graded.final_answers.len(), 5);
        assert_eq!(graded.questions_attempted, 3);
        assert_eq!(graded.questions_skipped, 2);
        let skipped = &graded.final_answers[1];
        assert!(!skipped.was_answered());
        assert_eq!(skipped.marks_awarded, Some(0));
    }

    #[test]
    fn essay_answers_defer_to_manual_grading() {
        let questions = vec![mcq(1, 5, 0), essay(2, 10)];
        let mut answers = HashMap::new();
        answers.insert(1, selected(1, 0));
        answers.insert(
            2,
            AnswerRecord {
                question_id: 2,
                payload: AnswerPayload::Text {
                    text_content: "An essay.".into(),
                    attachments: vec![],
                },
                last_modified: Utc::now(),
                time_spent_seconds: 60,
                is_marked_for_review: false,
                change_history: vec![],
            },
        );
        let graded = GradingService::grade(&questions, &answers);
        assert!(graded.manual_grading_pending);
        assert_eq!(graded.auto_graded_score, 5);
        assert_eq!(graded.final_answers[1].marks_awarded, None);
        assert!(graded.final_answers[1].needs_manual_grading);
    }

    #[test]
    fn authored_ids_grade_independently_regardless_of_order() {
        // Authored ids out of positional order must not collide or remap.
        let questions = vec![mcq(2, 10, 1), mcq(1, 10, 3)];
        let mut answers = HashMap::new();
        answers.insert(2, selected(2, 1)); // correct for question 2
        answers.insert(1, selected(1, 0)); // wrong for question 1
        let graded = GradingService::grade(&questions, &answers);
        assert_eq!(graded.final_answers.len(), 2);
        assert_eq!(graded.final_answers[0].question_id, 2);
        assert_eq!(graded.final_answers[1].question_id, 1);
        assert_eq!(graded.final_answers[0].is_correct, Some(true));
        assert_eq!(graded.final_answers[1].is_correct, Some(false));
        assert_eq!(graded.auto_graded_score, 10);
    }

    #[test]
    fn missing_ids_fall_back_to_position() {
        let questions = vec![mcq(0, 5, 0), mcq(0, 5, 1)];
        let mut answers = HashMap::new();
        answers.insert(2, selected(2, 1));
        let graded = GradingService::grade(&questions, &answers);
        assert_eq!(graded.final_answers[0].question_id, 1);
        assert_eq!(graded.final_answers[1].question_id, 2);
        assert_eq!(graded.auto_graded_score, 5);
    }

    #[test]
    fn integrity_thresholds_flag_compromise() {
        let thresholds = IntegrityThresholds::default();
        let mut session = EphemeralSession::shell(Uuid::new_v4(), Utc::now());
        session.tab_switch_count = 6;
        let report = GradingService::integrity_report(&session, &thresholds);
        assert!(report.is_integrity_compromised);

        session.tab_switch_count = 3;
        let report = GradingService::integrity_report(&session, &thresholds);
        assert!(!report.is_integrity_compromised);
    }
}
