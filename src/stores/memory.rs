use crate::error::Result;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::submission::Submission;
use crate::models::test::Test;
use crate::stores::{AttemptStore, SessionStore, SessionUpdate, SubmissionStore, TestSource};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// In-memory durable-store double. Used by every test that exercises the
/// attempt subsystem without a live backend.
#[derive(Clone, Default)]
pub struct MemoryAttemptStore {
    attempts: Arc<RwLock<HashMap<Uuid, Attempt>>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn create(&self, attempt: &Attempt) -> Result<()> {
        let mut guard = self.attempts.write().await;
        guard.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn get(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let guard = self.attempts.read().await;
        Ok(guard.get(&attempt_id).cloned())
    }

    async fn update(&self, attempt: &Attempt) -> Result<()> {
        let mut guard = self.attempts.write().await;
        guard.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn list_for(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>> {
        let guard = self.attempts.read().await;
        let mut rows: Vec<Attempt> = guard
            .values()
            .filter(|a| a.test_id == test_id && a.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.attempt_number.cmp(&a.attempt_number));
        Ok(rows)
    }

    async fn list_by_status(&self, statuses: &[AttemptStatus]) -> Result<Vec<Attempt>> {
        let guard = self.attempts.read().await;
        Ok(guard
            .values()
            .filter(|a| statuses.contains(&a.status))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemorySubmissionStore {
    submissions: Arc<RwLock<HashMap<Uuid, Submission>>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create_if_absent(&self, submission: &Submission) -> Result<Submission> {
        let mut guard = self.submissions.write().await;
        Ok(guard
            .entry(submission.attempt_id)
            .or_insert_with(|| submission.clone())
            .clone())
    }

    async fn get(&self, attempt_id: Uuid) -> Result<Option<Submission>> {
        let guard = self.submissions.read().await;
        Ok(guard.get(&attempt_id).cloned())
    }

    async fn update_if_version(
        &self,
        submission: &Submission,
        expected_version: i64,
    ) -> Result<bool> {
        let mut guard = self.submissions.write().await;
        match guard.get_mut(&submission.attempt_id) {
            Some(existing) if existing.version == expected_version => {
                let mut next = submission.clone();
                next.version = expected_version + 1;
                *existing = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryTestSource {
    tests: Arc<RwLock<HashMap<Uuid, Test>>>,
}

impl MemoryTestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, test: Test) {
        let mut guard = self.tests.write().await;
        guard.insert(test.id, test);
    }
}

#[async_trait]
impl TestSource for MemoryTestSource {
    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        let guard = self.tests.read().await;
        Ok(guard.get(&test_id).cloned())
    }
}

/// In-process ephemeral store: path-addressable JSON with broadcast
/// notifications and manually fireable on-disconnect writes. Losing this
/// state is survivable by design; the durable record regenerates it.
pub struct MemorySessionStore {
    values: Arc<RwLock<HashMap<String, JsonValue>>>,
    disconnect_writes: Arc<RwLock<HashMap<String, JsonValue>>>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            disconnect_writes: Arc::new(RwLock::new(HashMap::new())),
            updates,
        }
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the backing store dropping the client's connection: fires
    /// every registered on-disconnect merge. Test hook for the server-side
    /// offline flip.
    pub async fn fire_disconnect_writes(&self) -> Result<()> {
        let pending: Vec<(String, JsonValue)> = {
            let mut guard = self.disconnect_writes.write().await;
            guard.drain().collect()
        };
        for (path, value) in pending {
            self.merge(&path, value).await?;
        }
        Ok(())
    }

    fn notify(&self, path: &str, value: &JsonValue) {
        // No subscribers is fine.
        let _ = self.updates.send(SessionUpdate {
            path: path.to_string(),
            value: value.clone(),
        });
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, path: &str) -> Result<Option<JsonValue>> {
        let guard = self.values.read().await;
        Ok(guard.get(path).cloned())
    }

    async fn set(&self, path: &str, value: JsonValue) -> Result<()> {
        let mut guard = self.values.write().await;
        guard.insert(path.to_string(), value.clone());
        drop(guard);
        self.notify(path, &value);
        Ok(())
    }

    async fn merge(&self, path: &str, value: JsonValue) -> Result<()> {
        let mut guard = self.values.write().await;
        let merged = match (guard.get(path), &value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                let mut combined = existing.clone();
                for (k, v) in incoming {
                    combined.insert(k.clone(), v.clone());
                }
                JsonValue::Object(combined)
            }
            _ => value,
        };
        guard.insert(path.to_string(), merged.clone());
        drop(guard);
        self.notify(path, &merged);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut guard = self.values.write().await;
        guard.remove(path);
        drop(guard);
        self.notify(path, &JsonValue::Null);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    async fn on_disconnect_merge(&self, path: &str, value: JsonValue) -> Result<()> {
        let mut guard = self.disconnect_writes.write().await;
        guard.insert(path.to_string(), value);
        Ok(())
    }

    async fn clear_on_disconnect(&self, path: &str) -> Result<()> {
        let mut guard = self.disconnect_writes.write().await;
        guard.remove(path);
        Ok(())
    }
}
