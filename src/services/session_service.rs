use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::session::{
    AnswerChange, AnswerPayload, AnswerRecord, EphemeralSession, SuspiciousKind,
};
use crate::stores::{archive_path, clock_path, session_path, AttemptStore, SessionStore};
use crate::utils::time::Clock;
use std::sync::Arc;
use uuid::Uuid;

/// Real-time session tracker: owns the ephemeral working state of an active
/// attempt (answers, navigation, review marks, suspicious-activity signals).
/// Survives ephemeral-store data loss by recreating an empty shell from the
/// durable record — that path costs answers, never time fairness.
#[derive(Clone)]
pub struct SessionService {
    attempts: Arc<dyn AttemptStore>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attempts,
            sessions,
            clock,
        }
    }

    /// Loads the attempt and rejects writes against terminal ones. A save or
    /// tracking call racing past expiry must not silently re-open the state
    /// machine.
    async fn active_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        let attempt = self
            .attempts
            .get(attempt_id)
            .await?
            .ok_or(Error::AttemptNotFound(attempt_id))?;
        if attempt.is_terminal() {
            return Err(Error::AttemptAlreadyTerminal(attempt_id));
        }
        Ok(attempt)
    }

    pub async fn get_session(&self, attempt_id: Uuid) -> Result<Option<EphemeralSession>> {
        let raw = self.sessions.get(&session_path(attempt_id)).await?;
        match raw {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Existing session, or a fresh shell when the ephemeral store lost its
    /// record for a still-active attempt.
    pub async fn load_or_recreate(&self, attempt_id: Uuid) -> Result<EphemeralSession> {
        if let Some(session) = self.get_session(attempt_id).await? {
            return Ok(session);
        }
        let now = self.clock.now();
        let shell = EphemeralSession::shell(attempt_id, now);
        tracing::warn!(
            attempt_id = %attempt_id,
            "ephemeral session missing for active attempt, recreating shell"
        );
        self.put_session(&shell).await?;
        Ok(shell)
    }

    pub async fn put_session(&self, session: &EphemeralSession) -> Result<()> {
        self.sessions
            .set(&session_path(session.attempt_id), serde_json::to_value(session)?)
            .await
    }

    pub async fn save_answer(
        &self,
        attempt_id: Uuid,
        question_id: i32,
        payload: AnswerPayload,
        time_spent_seconds: i32,
        is_marked_for_review: Option<bool>,
    ) -> Result<AnswerRecord> {
        self.active_attempt(attempt_id).await?;
        let mut session = self.load_or_recreate(attempt_id).await?;
        let now = self.clock.now();

        let previous = session.answers.get(&question_id);
        let change = AnswerChange {
            timestamp: now,
            previous_value: previous.map(|p| p.payload.to_json()),
            new_value: payload.to_json(),
            time_on_question: time_spent_seconds,
        };

        // Current answer is last-writer-wins; the change history is
        // append-only so grading can reconstruct answer evolution.
        let mut change_history = previous
            .map(|p| p.change_history.clone())
            .unwrap_or_default();
        change_history.push(change);

        let marked = is_marked_for_review
            .unwrap_or_else(|| previous.map(|p| p.is_marked_for_review).unwrap_or(false));

        let record = AnswerRecord {
            question_id,
            payload,
            last_modified: now,
            time_spent_seconds,
            is_marked_for_review: marked,
            change_history,
        };

        session.answers.insert(question_id, record.clone());
        if marked {
            session.questions_marked_for_review.insert(question_id);
        } else {
            session.questions_marked_for_review.remove(&question_id);
        }
        session.last_activity = now;
        self.put_session(&session).await?;
        Ok(record)
    }

    pub async fn navigate_to_question(&self, attempt_id: Uuid, index: i32) -> Result<()> {
        if index < 0 {
            return Err(Error::Validation("question index must be >= 0".into()));
        }
        self.active_attempt(attempt_id).await?;
        let mut session = self.load_or_recreate(attempt_id).await?;
        session.current_question_index = index;
        session.questions_visited.insert(index);
        session.last_activity = self.clock.now();
        self.put_session(&session).await
    }

    /// Returns the new mark state.
    pub async fn toggle_review_mark(&self, attempt_id: Uuid, question_id: i32) -> Result<bool> {
        self.active_attempt(attempt_id).await?;
        let mut session = self.load_or_recreate(attempt_id).await?;
        let marked = if session.questions_marked_for_review.contains(&question_id) {
            session.questions_marked_for_review.remove(&question_id);
            false
        } else {
            session.questions_marked_for_review.insert(question_id);
            true
        };
        if let Some(answer) = session.answers.get_mut(&question_id) {
            answer.is_marked_for_review = marked;
        }
        session.last_activity = self.clock.now();
        self.put_session(&session).await?;
        Ok(marked)
    }

    /// Records a suspicious-activity signal and mirrors the running total
    /// onto the durable attempt record.
    pub async fn track_suspicious_activity(
        &self,
        attempt_id: Uuid,
        kind: SuspiciousKind,
    ) -> Result<i32> {
        let mut attempt = self.active_attempt(attempt_id).await?;
        let mut session = self.load_or_recreate(attempt_id).await?;
        let now = self.clock.now();

        let count = session.bump_counter(kind);
        session
            .suspicious_events
            .push(crate::models::session::SuspiciousEvent { kind, at: now });
        session.last_activity = now;
        self.put_session(&session).await?;

        attempt.suspicious_activity_count += 1;
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;

        tracing::info!(
            attempt_id = %attempt_id,
            kind = ?kind,
            count,
            "suspicious activity recorded"
        );
        Ok(count)
    }

    /// Bumps the session's disconnect counter; invoked by the lifecycle
    /// manager at a disconnect boundary.
    pub async fn record_disconnection(&self, attempt_id: Uuid) -> Result<()> {
        let mut session = self.load_or_recreate(attempt_id).await?;
        session.disconnection_count += 1;
        session.last_activity = self.clock.now();
        self.put_session(&session).await
    }

    /// Moves the session aside for audit and deletes the live paths. Runs
    /// once the attempt reaches a terminal state and grading has consumed
    /// the session.
    pub async fn archive_session(&self, attempt_id: Uuid) -> Result<()> {
        if let Some(raw) = self.sessions.get(&session_path(attempt_id)).await? {
            self.sessions.set(&archive_path(attempt_id), raw).await?;
        }
        self.sessions.delete(&session_path(attempt_id)).await?;
        self.sessions.delete(&clock_path(attempt_id)).await?;
        // The registered offline flip must not resurrect the deleted clock
        // when the connection finally drops.
        self.sessions
            .clear_on_disconnect(&clock_path(attempt_id))
            .await?;
        Ok(())
    }
}
