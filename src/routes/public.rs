use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::public_dto::{
    ActivityRequest, ActivityResponse, AttemptSummary, CreateAttemptRequest, HeartbeatResponse,
    NavigateRequest, PublicQuestion, ReviewMarkRequest, ReviewMarkResponse, SaveAnswerRequest,
    SaveAnswerResponse, StartAttemptResponse, StatusResponse, SubmitRequest, SubmitResponse,
};
use crate::error::Error;
use crate::models::submission::Submission;
use crate::services::attempt_service::CreateAttemptInput;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_attempt(
    State(state): State<AppState>,
    Json(req): Json<CreateAttemptRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let attempt = state
        .attempt_service
        .create_attempt(CreateAttemptInput {
            test_id: req.test_id,
            student_id: req.student_id,
            student_name: req.student_name,
            class_id: req.class_id,
        })
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)).into_response())
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let (attempt, _clock) = state.attempt_service.start_attempt(attempt_id).await?;
    let test = state
        .tests
        .get_test(attempt.test_id)
        .await?
        .ok_or(Error::TestNotFound(attempt.test_id))?;
    let questions = test
        .questions
        .iter()
        .enumerate()
        .map(|(idx, q)| PublicQuestion::from_question(q, idx))
        .collect();
    Ok(Json(StartAttemptResponse {
        attempt: AttemptSummary::from(&attempt),
        questions,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.get_attempt(attempt_id).await?;
    let check = state.attempt_service.current_time(&attempt).await?;
    let session = state.session_service.get_session(attempt_id).await?;
    let total_questions = state
        .tests
        .get_test(attempt.test_id)
        .await?
        .map(|t| t.questions.len() as i32);

    Ok(Json(StatusResponse {
        status: attempt.status,
        time_spent: check.time_spent,
        time_remaining: check.time_remaining,
        is_expired: check.is_expired,
        questions_answered: session.as_ref().map(|s| s.answers.len() as i32),
        total_questions,
        current_question_index: session.as_ref().map(|s| s.current_question_index),
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SaveAnswerRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let record = state
        .session_service
        .save_answer(
            attempt_id,
            req.question_id,
            req.answer,
            req.time_spent_seconds,
            req.marked_for_review,
        )
        .await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id: record.question_id,
        timestamp: record.last_modified,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<NavigateRequest>,
) -> crate::error::Result<Response> {
    state
        .session_service
        .navigate_to_question(attempt_id, req.question_index)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })).into_response())
}

#[axum::debug_handler]
pub async fn toggle_review(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<ReviewMarkRequest>,
) -> crate::error::Result<Response> {
    let marked = state
        .session_service
        .toggle_review_mark(attempt_id, req.question_id)
        .await?;
    Ok(Json(ReviewMarkResponse {
        question_id: req.question_id,
        marked,
    })
    .into_response())
}

#[axum::debug_handler]
pub async fn track_activity(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<ActivityRequest>,
) -> crate::error::Result<Response> {
    let count = state
        .session_service
        .track_suspicious_activity(attempt_id, req.kind)
        .await?;
    Ok(Json(ActivityResponse {
        kind: req.kind,
        count,
    })
    .into_response())
}

/// Heartbeat. A beat landing after the attempt turned terminal is a
/// success-no-op for the driver: it learns the time is gone instead of
/// getting an error to retry.
#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    match state.attempt_service.update_attempt_time(attempt_id).await {
        Ok(check) => Ok(Json(HeartbeatResponse {
            time_spent: check.time_spent,
            time_remaining: check.time_remaining,
            is_expired: check.is_expired,
            offline_seconds: check.offline_seconds,
        })
        .into_response()),
        Err(e) if e.is_terminal_guard() => {
            let attempt = state.attempt_service.get_attempt(attempt_id).await?;
            Ok(Json(HeartbeatResponse {
                time_spent: attempt.time_spent,
                time_remaining: 0,
                is_expired: true,
                offline_seconds: None,
            })
            .into_response())
        }
        Err(e) => Err(e),
    }
}

#[axum::debug_handler]
pub async fn disconnect(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.handle_disconnection(attempt_id).await?;
    Ok(Json(AttemptSummary::from(&attempt)).into_response())
}

#[axum::debug_handler]
pub async fn reconnect(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.handle_reconnection(attempt_id).await?;
    Ok(Json(AttemptSummary::from(&attempt)).into_response())
}

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> crate::error::Result<Response> {
    let submission = state
        .attempt_service
        .submit_attempt(attempt_id, req.is_auto_submitted.unwrap_or(false))
        .await?;
    Ok(Json(submit_response(&submission)).into_response())
}

#[axum::debug_handler]
pub async fn get_submission(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let submission = state.submission_service.get_submission(attempt_id).await?;
    Ok(Json(submit_response(&submission)).into_response())
}

fn submit_response(submission: &Submission) -> SubmitResponse {
    SubmitResponse {
        attempt_id: submission.attempt_id,
        auto_graded_score: submission.auto_graded_score,
        total_score: submission.total_score,
        max_score: submission.max_score,
        percentage: submission.percentage,
        pass_status: submission.pass_status,
        manual_grading_pending: submission.manual_grading_pending,
        is_auto_submitted: submission.is_auto_submitted,
        message: if submission.manual_grading_pending {
            "Test submitted. Some answers await manual grading.".to_string()
        } else {
            "Test submitted successfully.".to_string()
        },
    }
}
