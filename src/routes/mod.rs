pub mod health;
pub mod integration;
pub mod public;

use crate::middleware::rate_limit;
use crate::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

/// Full API router. Shared by `main` and the integration tests, so the wire
/// surface under test is exactly the one served.
pub fn app_router(state: AppState, public_rps: u32, operator_rps: u32) -> Router {
    let base = Router::new().route("/health", get(health::health));

    let public_api = Router::new()
        .route("/api/attempts", post(public::create_attempt))
        .route("/api/attempts/:id/start", post(public::start_attempt))
        .route("/api/attempts/:id", get(public::get_status))
        .route("/api/attempts/:id/answer", patch(public::save_answer))
        .route("/api/attempts/:id/navigate", post(public::navigate))
        .route("/api/attempts/:id/review", post(public::toggle_review))
        .route("/api/attempts/:id/activity", post(public::track_activity))
        .route("/api/attempts/:id/heartbeat", post(public::heartbeat))
        .route("/api/attempts/:id/disconnect", post(public::disconnect))
        .route("/api/attempts/:id/reconnect", post(public::reconnect))
        .route("/api/attempts/:id/submit", post(public::submit))
        .route("/api/attempts/:id/submission", get(public::get_submission))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(public_rps),
            rate_limit::rps_middleware,
        ));

    let operator_api = Router::new()
        .route("/api/integration/attempts", get(integration::list_attempts))
        .route(
            "/api/integration/attempts/:id",
            get(integration::get_attempt),
        )
        .route(
            "/api/integration/attempts/:id/terminate",
            post(integration::terminate_attempt),
        )
        .route(
            "/api/integration/submissions/:id",
            get(integration::get_submission),
        )
        .route(
            "/api/integration/submissions/:id/reprocess",
            post(integration::reprocess_submission),
        )
        .route(
            "/api/integration/submissions/:id/grade-essay",
            post(integration::grade_essay),
        )
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(operator_rps),
            rate_limit::rps_middleware,
        ));

    base.merge(public_api).merge(operator_api).with_state(state)
}
