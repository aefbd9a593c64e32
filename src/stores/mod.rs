pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::submission::Submission;
use crate::models::test::Test;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Durable store for attempt records (system of record for status and
/// cumulative time). Read-your-writes consistency on the same key is
/// assumed from the backing store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create(&self, attempt: &Attempt) -> Result<()>;
    async fn get(&self, attempt_id: Uuid) -> Result<Option<Attempt>>;
    /// Full-record update keyed by attempt id.
    async fn update(&self, attempt: &Attempt) -> Result<()>;
    /// All attempts for a (test, student) pair, ordered by attempt_number
    /// descending.
    async fn list_for(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>>;
    /// Attempts currently in any of the given statuses (background sweep).
    async fn list_by_status(&self, statuses: &[AttemptStatus]) -> Result<Vec<Attempt>>;
}

/// Durable store for immutable submission records.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create-if-absent. Returns the stored record: the freshly written one,
    /// or the pre-existing one when a submission for this attempt already
    /// exists (at-most-once semantics).
    async fn create_if_absent(&self, submission: &Submission) -> Result<Submission>;
    async fn get(&self, attempt_id: Uuid) -> Result<Option<Submission>>;
    /// Version-guarded update for manual grading. Returns false when the
    /// stored version no longer matches `expected_version` (caller re-reads
    /// and retries).
    async fn update_if_version(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<bool>;
}

/// Read-only source of test definitions (questions with correct answers,
/// duration, availability window, attempt policy).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestSource: Send + Sync {
    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>>;
}

#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub path: String,
    pub value: JsonValue,
}

/// Low-latency ephemeral store: path-addressable JSON values with
/// subscribe/notify and a best-effort on-disconnect write hook. May lose its
/// contents at any time; everything in it is reconcilable from the durable
/// attempt record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<JsonValue>>;
    async fn set(&self, path: &str, value: JsonValue) -> Result<()>;
    /// Shallow object merge into the value at `path`.
    async fn merge(&self, path: &str, value: JsonValue) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// Stream of writes; callers filter by path.
    fn subscribe(&self) -> broadcast::Receiver<SessionUpdate>;
    /// Register a merge to fire when the client's connection drops, so the
    /// server can flip the clock offline without client cooperation.
    async fn on_disconnect_merge(&self, path: &str, value: JsonValue) -> Result<()>;
    async fn clear_on_disconnect(&self, path: &str) -> Result<()>;
}

pub fn clock_path(attempt_id: Uuid) -> String {
    format!("sessions/{}/clock", attempt_id)
}

pub fn session_path(attempt_id: Uuid) -> String {
    format!("sessions/{}/state", attempt_id)
}

/// Archived sessions are moved aside rather than dropped, for audit.
pub fn archive_path(attempt_id: Uuid) -> String {
    format!("archive/{}/state", attempt_id)
}
