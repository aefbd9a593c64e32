pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod stores;
pub mod utils;

use crate::config::IntegrityThresholds;
use crate::services::attempt_service::AttemptService;
use crate::services::session_service::SessionService;
use crate::services::submission_service::SubmissionService;
use crate::stores::{AttemptStore, SessionStore, SubmissionStore, TestSource};
use crate::utils::time::Clock;
use std::sync::Arc;

/// Shared application state: explicit store handles plus the stateless
/// services built over them. Everything behind the ports, so the whole
/// subsystem runs against in-memory stores in tests.
#[derive(Clone)]
pub struct AppState {
    pub attempts: Arc<dyn AttemptStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub tests: Arc<dyn TestSource>,
    pub sessions: Arc<dyn SessionStore>,
    pub attempt_service: AttemptService,
    pub session_service: SessionService,
    pub submission_service: SubmissionService,
}

impl AppState {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        submissions: Arc<dyn SubmissionStore>,
        tests: Arc<dyn TestSource>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        heartbeat_sync_secs: i64,
        thresholds: IntegrityThresholds,
    ) -> Self {
        let session_service =
            SessionService::new(attempts.clone(), sessions.clone(), clock.clone());
        let submission_service = SubmissionService::new(
            attempts.clone(),
            submissions.clone(),
            tests.clone(),
            session_service.clone(),
            clock.clone(),
            thresholds,
        );
        let attempt_service = AttemptService::new(
            attempts.clone(),
            sessions.clone(),
            tests.clone(),
            clock,
            session_service.clone(),
            submission_service.clone(),
            heartbeat_sync_secs,
        );

        Self {
            attempts,
            submissions,
            tests,
            sessions,
            attempt_service,
            session_service,
            submission_service,
        }
    }
}
