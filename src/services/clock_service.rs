use crate::models::session::SessionClockState;
use chrono::{DateTime, Utc};

/// Result of one authoritative time computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCheck {
    pub time_spent: i64,
    pub time_remaining: i64,
    pub is_expired: bool,
    /// Seconds spent offline since disconnect. Diagnostics only; never
    /// charged against the student.
    pub offline_seconds: Option<i64>,
}

/// Pure time accounting: session clock state + now -> spent/remaining/expired.
///
/// Online time is charged from the start of the current online stretch.
/// Offline time does not advance the clock at all: a disconnected student
/// keeps exactly the remaining time they had at the moment of disconnect.
/// The absolute deadline (`end_time_ceiling` on the attempt) bounds how long
/// that grace can be exploited; it is enforced by the lifecycle manager, not
/// here.
pub fn compute_time(
    clock: &SessionClockState,
    total_time_allowed: i64,
    now: DateTime<Utc>,
) -> TimeCheck {
    if clock.is_online {
        let elapsed = clock
            .session_start_time
            .map(|start| (now - start).num_seconds().max(0))
            .unwrap_or(0);
        let time_spent = clock.total_time_spent + elapsed;
        let time_remaining = (total_time_allowed - time_spent).max(0);
        TimeCheck {
            time_spent,
            time_remaining,
            is_expired: time_remaining <= 0,
            offline_seconds: None,
        }
    } else {
        let offline_seconds = clock
            .disconnected_at
            .map(|at| (now - at).num_seconds().max(0));
        let time_remaining = clock.time_remaining.max(0);
        TimeCheck {
            time_spent: clock.total_time_spent,
            time_remaining,
            is_expired: time_remaining <= 0,
            offline_seconds,
        }
    }
}

/// Folds the current online stretch into the accumulated totals, producing
/// the clock state to persist at a disconnect boundary.
pub fn fold_offline(
    clock: &SessionClockState,
    total_time_allowed: i64,
    now: DateTime<Utc>,
) -> SessionClockState {
    let check = compute_time(clock, total_time_allowed, now);
    SessionClockState {
        is_online: false,
        session_start_time: None,
        total_time_spent: check.time_spent,
        time_remaining: check.time_remaining,
        disconnected_at: Some(now),
        last_synced_at: clock.last_synced_at,
    }
}
