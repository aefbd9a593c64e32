use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Ephemeral clock state for one attempt. A cache of the durable attempt's
/// time fields plus "currently online since T" — it carries nothing the
/// durable record cannot regenerate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClockState {
    pub is_online: bool,
    /// Wall-clock mark of the current online stretch. None while offline.
    pub session_start_time: Option<DateTime<Utc>>,
    /// Online seconds accumulated before the current stretch.
    pub total_time_spent: i64,
    pub time_remaining: i64,
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Last durable sync; heartbeats batch their durable writes against this.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SessionClockState {
    pub fn online(now: DateTime<Utc>, time_spent: i64, time_remaining: i64) -> Self {
        Self {
            is_online: true,
            session_start_time: Some(now),
            total_time_spent: time_spent,
            time_remaining,
            disconnected_at: None,
            last_synced_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousKind {
    TabSwitch,
    CopyPaste,
    RightClick,
    KeyboardShortcut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousEvent {
    pub kind: SuspiciousKind,
    pub at: DateTime<Utc>,
}

/// One entry of the append-only answer history. Never overwritten, so the
/// grading processor can reconstruct answer evolution afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerChange {
    pub timestamp: DateTime<Utc>,
    pub previous_value: Option<JsonValue>,
    pub new_value: JsonValue,
    pub time_on_question: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    Selected {
        selected_option: i32,
    },
    Text {
        text_content: String,
        #[serde(default)]
        attachments: Vec<String>,
    },
}

impl AnswerPayload {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i32,
    pub payload: AnswerPayload,
    pub last_modified: DateTime<Utc>,
    pub time_spent_seconds: i32,
    pub is_marked_for_review: bool,
    pub change_history: Vec<AnswerChange>,
}

/// Live working state of an in-progress attempt. Disposable: losing it costs
/// answers, never time fairness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralSession {
    pub attempt_id: Uuid,
    pub current_question_index: i32,
    pub answers: HashMap<i32, AnswerRecord>,
    pub questions_visited: BTreeSet<i32>,
    pub questions_marked_for_review: BTreeSet<i32>,
    pub tab_switch_count: i32,
    pub copy_paste_count: i32,
    pub right_click_count: i32,
    pub keyboard_shortcut_count: i32,
    pub disconnection_count: i32,
    pub suspicious_events: Vec<SuspiciousEvent>,
    pub last_activity: DateTime<Utc>,
}

impl EphemeralSession {
    /// Fresh shell, also used on the resync path when the ephemeral store
    /// lost its record for a still-active attempt.
    pub fn shell(attempt_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            attempt_id,
            current_question_index: 0,
            answers: HashMap::new(),
            questions_visited: BTreeSet::new(),
            questions_marked_for_review: BTreeSet::new(),
            tab_switch_count: 0,
            copy_paste_count: 0,
            right_click_count: 0,
            keyboard_shortcut_count: 0,
            disconnection_count: 0,
            suspicious_events: Vec::new(),
            last_activity: now,
        }
    }

    pub fn bump_counter(&mut self, kind: SuspiciousKind) -> i32 {
        let counter = match kind {
            SuspiciousKind::TabSwitch => &mut self.tab_switch_count,
            SuspiciousKind::CopyPaste => &mut self.copy_paste_count,
            SuspiciousKind::RightClick => &mut self.right_click_count,
            SuspiciousKind::KeyboardShortcut => &mut self.keyboard_shortcut_count,
        };
        *counter += 1;
        *counter
    }
}
