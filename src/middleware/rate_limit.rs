use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    remaining: u32,
}

/// Fixed one-second window limiter shared by all clones of a router group.
/// Heartbeats arrive once per second per active attempt, so the public limit
/// is effectively a cap on concurrent test-takers per instance.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    window: Arc<Mutex<Window>>,
}

impl RateLimiter {
    fn new(rps: u32) -> Self {
        let rps = rps.max(1);
        Self {
            rps,
            window: Arc::new(Mutex::new(Window {
                opened_at: Instant::now(),
                remaining: rps,
            })),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut guard = self.window.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        if now.duration_since(guard.opened_at) >= Duration::from_secs(1) {
            guard.opened_at = now;
            guard.remaining = self.rps;
        }
        if guard.remaining > 0 {
            guard.remaining -= 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.try_acquire() {
        return (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded").into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}
