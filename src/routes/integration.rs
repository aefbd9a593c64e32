use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::operator_dto::{GradeEssayRequest, ListAttemptsQuery};
use crate::dto::public_dto::AttemptSummary;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<ListAttemptsQuery>,
) -> crate::error::Result<Response> {
    let attempts = state
        .attempts
        .list_for(query.test_id, query.student_id)
        .await?;
    let summaries: Vec<AttemptSummary> = attempts.iter().map(AttemptSummary::from).collect();
    Ok(Json(summaries).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.get_attempt(attempt_id).await?;
    Ok(Json(attempt).into_response())
}

#[axum::debug_handler]
pub async fn get_submission(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let submission = state.submission_service.get_submission(attempt_id).await?;
    Ok(Json(submission).into_response())
}

/// Operator retry for a failed auto-submission pipeline: the attempt is
/// terminal but ungraded, and its session is still in place.
#[axum::debug_handler]
pub async fn reprocess_submission(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let submission = state
        .submission_service
        .process_submission(attempt_id, true)
        .await?;
    Ok(Json(submission).into_response())
}

#[axum::debug_handler]
pub async fn grade_essay(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<GradeEssayRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let submission = state
        .submission_service
        .grade_essay_question(
            attempt_id,
            req.question_id,
            req.marks_awarded,
            req.feedback,
            req.graded_by,
        )
        .await?;
    Ok(Json(submission).into_response())
}

#[axum::debug_handler]
pub async fn terminate_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.terminate_attempt(attempt_id).await?;
    Ok(Json(AttemptSummary::from(&attempt)).into_response())
}
