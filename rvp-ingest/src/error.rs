//! Error types for rvp-ingest
//!
//! Handler errors render as `{"error": {"code", "message"}}` with a
//! matching HTTP status.

use crate::pipeline::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., run already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dependency not ready (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::AlreadyRunning
            | PipelineError::NoActiveRun
            | PipelineError::RetryInFlight(_) => ApiError::Conflict(message),
            PipelineError::InvalidConcurrency(_) | PipelineError::InvalidDuration(_) => {
                ApiError::BadRequest(message)
            }
            PipelineError::UnknownFailure(_) => ApiError::NotFound(message),
            PipelineError::ScorerNotReady => ApiError::Unavailable(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
