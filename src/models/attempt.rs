use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one attempt. Once a terminal status is reached the attempt
/// never re-enters a non-terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Paused,
    Submitted,
    AutoSubmitted,
    Expired,
    Terminated,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Submitted
                | AttemptStatus::AutoSubmitted
                | AttemptStatus::Expired
                | AttemptStatus::Terminated
        )
    }

    /// Active statuses block creation of a second attempt for the same
    /// (test, student) pair.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Paused => "paused",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto_submitted",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Terminated => "terminated",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(AttemptStatus::NotStarted),
            "in_progress" => Ok(AttemptStatus::InProgress),
            "paused" => Ok(AttemptStatus::Paused),
            "submitted" => Ok(AttemptStatus::Submitted),
            "auto_submitted" => Ok(AttemptStatus::AutoSubmitted),
            "expired" => Ok(AttemptStatus::Expired),
            "terminated" => Ok(AttemptStatus::Terminated),
            other => Err(format!("unknown attempt status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventKind {
    Connect,
    Disconnect,
    /// Durable time sync carried by a heartbeat (heartbeats themselves are
    /// too frequent to log individually).
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub kind: ConnectionEventKind,
    pub at: DateTime<Utc>,
}

/// Durable record of one student's run at one test. System of record for
/// status and cumulative time; the ephemeral session is always reconcilable
/// from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub class_id: Option<Uuid>,
    /// 1-based, unique per (test_id, student_id), monotonically increasing.
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Absolute upper bound: started_at + total_time_allowed. Independent of
    /// pauses; any observation past it forces expiry.
    pub end_time_ceiling: Option<DateTime<Utc>>,
    pub total_time_allowed: i64,
    /// Cumulative online seconds. Monotonically non-decreasing.
    pub time_spent: i64,
    /// total_time_allowed - time_spent, floored at 0. Non-increasing.
    pub time_remaining: i64,
    pub connection_events: Vec<ConnectionEvent>,
    pub suspicious_activity_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn push_event(&mut self, kind: ConnectionEventKind, at: DateTime<Utc>) {
        self.connection_events.push(ConnectionEvent { kind, at });
    }
}
