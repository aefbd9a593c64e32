use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Attempt limit exceeded: {attempts_allowed} attempts allowed for this test")]
    AttemptLimitExceeded { attempts_allowed: i32 },

    #[error("Test unavailable: {0}")]
    TestUnavailable(String),

    #[error("Test not found: {0}")]
    TestNotFound(Uuid),

    #[error("Attempt not found: {0}")]
    AttemptNotFound(Uuid),

    #[error("Session not found for attempt: {0}")]
    SessionNotFound(Uuid),

    #[error("Submission not found for attempt: {0}")]
    SubmissionNotFound(Uuid),

    #[error("Attempt {0} is already in a terminal state")]
    AttemptAlreadyTerminal(Uuid),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Request validation error: {0}")]
    RequestValidation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `AttemptAlreadyTerminal` is an idempotency guard, not a failure:
    /// callers retrying a heartbeat or a submit after expiry treat it as a
    /// successful no-op.
    pub fn is_terminal_guard(&self) -> bool {
        matches!(self, Error::AttemptAlreadyTerminal(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::RequestValidation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::AttemptLimitExceeded { .. } => (StatusCode::CONFLICT, self.to_string()),
            Error::TestUnavailable(msg) => (StatusCode::FORBIDDEN, msg),
            Error::TestNotFound(_)
            | Error::AttemptNotFound(_)
            | Error::SessionNotFound(_)
            | Error::SubmissionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::AttemptAlreadyTerminal(_) => (StatusCode::CONFLICT, self.to_string()),
            Error::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Anyhow(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::Internal("Row not found".to_string()),
            other => Error::Database(other),
        }
    }
}
