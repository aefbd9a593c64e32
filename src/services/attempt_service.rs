use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptStatus, ConnectionEventKind};
use crate::models::session::{EphemeralSession, SessionClockState};
use crate::models::submission::Submission;
use crate::services::clock_service::{self, TimeCheck};
use crate::services::session_service::SessionService;
use crate::services::submission_service::SubmissionService;
use crate::stores::{clock_path, AttemptStore, SessionStore, TestSource};
use crate::utils::time::Clock;
use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateAttemptInput {
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub class_id: Option<Uuid>,
}

/// Attempt lifecycle manager. Owns the state machine
/// not_started -> in_progress <-> paused -> {submitted | auto_submitted | expired},
/// with terminated reachable from any non-terminal state. Terminal states
/// never re-open.
#[derive(Clone)]
pub struct AttemptService {
    attempts: Arc<dyn AttemptStore>,
    sessions: Arc<dyn SessionStore>,
    tests: Arc<dyn TestSource>,
    clock: Arc<dyn Clock>,
    session_service: SessionService,
    submission_service: SubmissionService,
    /// Minimum interval between durable writes of heartbeat time updates.
    sync_interval_secs: i64,
}

impl AttemptService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        sessions: Arc<dyn SessionStore>,
        tests: Arc<dyn TestSource>,
        clock: Arc<dyn Clock>,
        session_service: SessionService,
        submission_service: SubmissionService,
        sync_interval_secs: i64,
    ) -> Self {
        Self {
            attempts,
            sessions,
            tests,
            clock,
            session_service,
            submission_service,
            sync_interval_secs,
        }
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.attempts
            .get(attempt_id)
            .await?
            .ok_or(Error::AttemptNotFound(attempt_id))
    }

    /// Creates a new durable attempt, enforcing the attempt-count and
    /// availability-window policy. Attempt numbers are 1-based and assigned
    /// from the count of prior attempts for the (test, student) pair.
    pub async fn create_attempt(&self, input: CreateAttemptInput) -> Result<Attempt> {
        if input.student_name.trim().is_empty() {
            return Err(Error::Validation("student_name must not be empty".into()));
        }

        let test = self
            .tests
            .get_test(input.test_id)
            .await?
            .ok_or(Error::TestNotFound(input.test_id))?;

        let now = self.clock.now();
        if !test.is_available_at(now) {
            return Err(Error::TestUnavailable(
                "test is outside its availability window".into(),
            ));
        }
        if let Some(id) = test.duplicate_question_id() {
            return Err(Error::Validation(format!(
                "test definition has duplicate question id {}",
                id
            )));
        }

        let existing = self
            .attempts
            .list_for(input.test_id, input.student_id)
            .await?;
        if existing.len() as i32 >= test.attempts_allowed {
            return Err(Error::AttemptLimitExceeded {
                attempts_allowed: test.attempts_allowed,
            });
        }
        if existing.iter().any(|a| a.status.is_active()) {
            return Err(Error::Validation(
                "student already has an active attempt for this test".into(),
            ));
        }

        let total = test.total_time_allowed_secs();
        let attempt = Attempt {
            id: Uuid::new_v4(),
            test_id: input.test_id,
            student_id: input.student_id,
            student_name: input.student_name,
            class_id: input.class_id,
            attempt_number: existing.len() as i32 + 1,
            status: AttemptStatus::NotStarted,
            started_at: None,
            end_time_ceiling: None,
            total_time_allowed: total,
            time_spent: 0,
            time_remaining: total,
            connection_events: Vec::new(),
            suspicious_activity_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.attempts.create(&attempt).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            attempt_number = attempt.attempt_number,
            "attempt created"
        );
        Ok(attempt)
    }

    /// Transitions not_started -> in_progress and initializes the session
    /// clock. Idempotent: a reload calling start on an already running
    /// attempt gets the current state back instead of an error.
    pub async fn start_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<(Attempt, SessionClockState)> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        let now = self.clock.now();

        match attempt.status {
            AttemptStatus::NotStarted => {
                attempt.status = AttemptStatus::InProgress;
                attempt.started_at = Some(now);
                attempt.end_time_ceiling =
                    Some(now + Duration::seconds(attempt.total_time_allowed));
                attempt.push_event(ConnectionEventKind::Connect, now);
                attempt.updated_at = now;
                self.attempts.update(&attempt).await?;

                let clock = SessionClockState::online(now, 0, attempt.total_time_allowed);
                self.put_clock(attempt_id, &clock).await?;
                self.session_service
                    .put_session(&EphemeralSession::shell(attempt_id, now))
                    .await?;
                // Server-side offline flip if the client vanishes without a
                // disconnect call.
                self.sessions
                    .on_disconnect_merge(&clock_path(attempt_id), json!({ "is_online": false }))
                    .await?;
                Ok((attempt, clock))
            }
            AttemptStatus::InProgress => {
                let clock = self.ensure_clock(&attempt).await?;
                Ok((attempt, clock))
            }
            AttemptStatus::Paused => {
                let attempt = self.handle_reconnection(attempt_id).await?;
                // Reconnection can discover the ceiling passed while paused
                // and expire the attempt; recreating a clock for it would
                // orphan an entry in paths archival just cleared.
                if attempt.is_terminal() {
                    return Err(Error::AttemptAlreadyTerminal(attempt_id));
                }
                let clock = self.ensure_clock(&attempt).await?;
                Ok((attempt, clock))
            }
            _ => Err(Error::AttemptAlreadyTerminal(attempt_id)),
        }
    }

    async fn put_clock(&self, attempt_id: Uuid, clock: &SessionClockState) -> Result<()> {
        self.sessions
            .set(&clock_path(attempt_id), serde_json::to_value(clock)?)
            .await
    }

    /// Loads the ephemeral clock, reinitializing it from the durable record
    /// when the ephemeral copy is gone. This is the resync path after
    /// session-store data loss: the durable attempt is the system of record.
    async fn ensure_clock(&self, attempt: &Attempt) -> Result<SessionClockState> {
        if let Some(raw) = self.sessions.get(&clock_path(attempt.id)).await? {
            return Ok(serde_json::from_value(raw)?);
        }
        let now = self.clock.now();
        tracing::warn!(
            attempt_id = %attempt.id,
            "session clock missing, reinitializing from durable attempt"
        );
        let clock = SessionClockState::online(now, attempt.time_spent, attempt.time_remaining);
        self.put_clock(attempt.id, &clock).await?;
        Ok(clock)
    }

    /// Heartbeat: recomputes authoritative time, persists the ephemeral
    /// clock, batches durable syncs, and detects expiry. Enforces the
    /// absolute ceiling regardless of offline credit.
    pub async fn update_attempt_time(&self, attempt_id: Uuid) -> Result<TimeCheck> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_terminal() {
            return Err(Error::AttemptAlreadyTerminal(attempt_id));
        }
        if attempt.status == AttemptStatus::NotStarted {
            return Err(Error::Validation("attempt has not been started".into()));
        }

        let now = self.clock.now();

        // Offline gaps are never charged against time_remaining, but the
        // window itself is absolute: past the ceiling the attempt expires no
        // matter what the local computation says.
        if let Some(ceiling) = attempt.end_time_ceiling {
            if now > ceiling {
                let attempt = self.mark_expired(attempt_id).await?;
                return Ok(TimeCheck {
                    time_spent: attempt.time_spent,
                    time_remaining: 0,
                    is_expired: true,
                    offline_seconds: None,
                });
            }
        }

        let mut clock = self.ensure_clock(&attempt).await?;
        let check = clock_service::compute_time(&clock, attempt.total_time_allowed, now);

        if check.is_expired {
            let attempt = self.mark_expired(attempt_id).await?;
            return Ok(TimeCheck {
                time_spent: attempt.time_spent,
                time_remaining: 0,
                is_expired: true,
                offline_seconds: check.offline_seconds,
            });
        }

        clock.time_remaining = check.time_remaining;
        let due_for_sync = clock
            .last_synced_at
            .map(|at| (now - at).num_seconds() >= self.sync_interval_secs)
            .unwrap_or(true);
        if due_for_sync {
            attempt.time_spent = check.time_spent;
            attempt.time_remaining = check.time_remaining;
            attempt.push_event(ConnectionEventKind::Sync, now);
            attempt.updated_at = now;
            self.attempts.update(&attempt).await?;
            clock.last_synced_at = Some(now);
        }
        self.put_clock(attempt_id, &clock).await?;

        Ok(check)
    }

    /// Terminal transition on expiry. Safe to call concurrently and
    /// redundantly: once terminal, repeated calls are no-ops. Attempts the
    /// auto-submission pipeline; a pipeline failure leaves the attempt in a
    /// recoverable terminal-but-ungraded state for the operator retry path.
    pub async fn mark_expired(&self, attempt_id: Uuid) -> Result<Attempt> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_terminal() {
            return Ok(attempt);
        }

        let now = self.clock.now();
        let has_session = self
            .session_service
            .get_session(attempt_id)
            .await?
            .is_some();
        attempt.status = if has_session {
            AttemptStatus::AutoSubmitted
        } else {
            AttemptStatus::Expired
        };
        // Ceiling-forced expiry can land with online time still unspent;
        // keep the honest figure rather than rounding up to the allowance.
        let check = {
            let clock = self.ensure_clock(&attempt).await?;
            clock_service::compute_time(&clock, attempt.total_time_allowed, now)
        };
        attempt.time_spent = check.time_spent.min(attempt.total_time_allowed);
        attempt.time_remaining = 0;
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;

        let clock = SessionClockState {
            is_online: false,
            session_start_time: None,
            total_time_spent: attempt.time_spent,
            time_remaining: 0,
            disconnected_at: Some(now),
            last_synced_at: Some(now),
        };
        self.put_clock(attempt_id, &clock).await?;

        tracing::info!(attempt_id = %attempt_id, status = ?attempt.status, "attempt expired");

        if has_session {
            if let Err(e) = self
                .submission_service
                .process_submission(attempt_id, true)
                .await
            {
                // Answers must not be lost: the attempt stays terminal and
                // ungraded until an operator reprocesses it.
                tracing::error!(
                    attempt_id = %attempt_id,
                    error = ?e,
                    "auto-submission pipeline failed, awaiting operator reprocess"
                );
            }
        }
        self.get_attempt(attempt_id).await
    }

    /// Connectivity loss: folds the current online stretch into the durable
    /// totals and pauses the attempt. Offline time will not be charged.
    pub async fn handle_disconnection(&self, attempt_id: Uuid) -> Result<Attempt> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_terminal() {
            return Err(Error::AttemptAlreadyTerminal(attempt_id));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Ok(attempt);
        }

        let now = self.clock.now();
        let clock = self.ensure_clock(&attempt).await?;
        let folded = clock_service::fold_offline(&clock, attempt.total_time_allowed, now);

        attempt.status = AttemptStatus::Paused;
        attempt.time_spent = folded.total_time_spent;
        attempt.time_remaining = folded.time_remaining;
        attempt.push_event(ConnectionEventKind::Disconnect, now);
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;
        self.put_clock(attempt_id, &folded).await?;
        self.session_service.record_disconnection(attempt_id).await?;

        tracing::info!(
            attempt_id = %attempt_id,
            time_remaining = folded.time_remaining,
            "attempt paused on disconnect"
        );
        Ok(attempt)
    }

    /// Reconnection resumes the online stretch, unless the attempt already
    /// ran out of time (or sailed past its absolute ceiling) while away, in
    /// which case it expires instead of resuming.
    pub async fn handle_reconnection(&self, attempt_id: Uuid) -> Result<Attempt> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_terminal() {
            return Err(Error::AttemptAlreadyTerminal(attempt_id));
        }

        let now = self.clock.now();
        let past_ceiling = attempt
            .end_time_ceiling
            .map(|ceiling| now > ceiling)
            .unwrap_or(false);
        if past_ceiling || attempt.time_remaining <= 0 {
            return self.mark_expired(attempt_id).await;
        }

        // Spurious reconnect while already online (flaky browser online
        // events, client retries): the ephemeral clock is ahead of the
        // durable snapshot by up to one sync interval, so rebuilding from
        // the durable record would roll accumulated time back. Keep the
        // running clock untouched.
        if attempt.status == AttemptStatus::InProgress {
            self.ensure_clock(&attempt).await?;
            self.sessions
                .on_disconnect_merge(&clock_path(attempt_id), json!({ "is_online": false }))
                .await?;
            return Ok(attempt);
        }

        let clock = SessionClockState {
            is_online: true,
            session_start_time: Some(now),
            total_time_spent: attempt.time_spent,
            time_remaining: attempt.time_remaining,
            disconnected_at: None,
            last_synced_at: Some(now),
        };
        attempt.status = AttemptStatus::InProgress;
        attempt.push_event(ConnectionEventKind::Connect, now);
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;
        self.put_clock(attempt_id, &clock).await?;
        self.sessions
            .on_disconnect_merge(&clock_path(attempt_id), json!({ "is_online": false }))
            .await?;
        Ok(attempt)
    }

    /// Student (or auto) submission: final time fold, terminal transition,
    /// hand-off to the grading processor. At-most-once effective: a repeat
    /// call on a terminal attempt returns the existing submission.
    pub async fn submit_attempt(
        &self,
        attempt_id: Uuid,
        is_auto_submitted: bool,
    ) -> Result<Submission> {
        let mut attempt = self.get_attempt(attempt_id).await?;

        if attempt.is_terminal() {
            if attempt.status == AttemptStatus::Terminated {
                return Err(Error::AttemptAlreadyTerminal(attempt_id));
            }
            // Either already graded (no-op returns the record) or the
            // pipeline failed earlier and this is a retry.
            return self
                .submission_service
                .process_submission(attempt_id, is_auto_submitted)
                .await;
        }
        if attempt.status == AttemptStatus::NotStarted {
            return Err(Error::Validation("attempt has not been started".into()));
        }

        let now = self.clock.now();
        let clock = self.ensure_clock(&attempt).await?;
        let check = clock_service::compute_time(&clock, attempt.total_time_allowed, now);

        attempt.status = if is_auto_submitted {
            AttemptStatus::AutoSubmitted
        } else {
            AttemptStatus::Submitted
        };
        attempt.time_spent = check.time_spent.min(attempt.total_time_allowed);
        attempt.time_remaining = check.time_remaining;
        attempt.push_event(ConnectionEventKind::Sync, now);
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;
        self.put_clock(
            attempt_id,
            &clock_service::fold_offline(&clock, attempt.total_time_allowed, now),
        )
        .await?;

        self.submission_service
            .process_submission(attempt_id, is_auto_submitted)
            .await
    }

    /// Administrative kill switch. No grading runs; the session is archived
    /// as-is.
    pub async fn terminate_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        let mut attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_terminal() {
            return Ok(attempt);
        }
        let now = self.clock.now();
        attempt.status = AttemptStatus::Terminated;
        attempt.updated_at = now;
        self.attempts.update(&attempt).await?;
        self.session_service.archive_session(attempt_id).await?;
        tracing::warn!(attempt_id = %attempt_id, "attempt terminated by operator");
        Ok(attempt)
    }

    /// Background sweep: force-expires active attempts whose absolute
    /// ceiling has passed, covering clients that vanished without a final
    /// heartbeat. Returns the number of attempts expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let active = self
            .attempts
            .list_by_status(&[AttemptStatus::InProgress, AttemptStatus::Paused])
            .await?;
        let mut expired = 0;
        for attempt in active {
            let past_ceiling = attempt
                .end_time_ceiling
                .map(|ceiling| now > ceiling)
                .unwrap_or(false);
            if past_ceiling {
                if let Err(e) = self.mark_expired(attempt.id).await {
                    tracing::error!(attempt_id = %attempt.id, error = ?e, "sweep expiry failed");
                } else {
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    /// Non-mutating authoritative time view for status endpoints.
    pub async fn current_time(&self, attempt: &Attempt) -> Result<TimeCheck> {
        if attempt.is_terminal() || attempt.status == AttemptStatus::NotStarted {
            return Ok(TimeCheck {
                time_spent: attempt.time_spent,
                time_remaining: attempt.time_remaining,
                is_expired: attempt.is_terminal() && attempt.time_remaining <= 0,
                offline_seconds: None,
            });
        }
        let clock = self.ensure_clock(attempt).await?;
        Ok(clock_service::compute_time(
            &clock,
            attempt.total_time_allowed,
            self.clock.now(),
        ))
    }
}
