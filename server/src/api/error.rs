//! API Errors

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::control::ControlError;
use crate::engine::EngineError;
use crate::ratelimit::RateLimitError;

/// Errors returned by operator and event endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    /// The engine refused the change.
    #[error("Could not apply permission level for {0}")]
    ApplyFailed(Uuid),

    /// Too many level-changing commands from one actor.
    #[error("Rate limited: retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// The control context stopped.
    #[error("Service is shutting down")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string()),
            Self::ApplyFailed(_) => (StatusCode::BAD_GATEWAY, "APPLY_FAILED", self.to_string()),
            Self::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", self.to_string())
            }
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                self.to_string(),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<tierward_common::Error> for ApiError {
    fn from(err: tierward_common::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ControlError> for ApiError {
    fn from(_: ControlError) -> Self {
        Self::Unavailable
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        Self::RateLimited {
            retry_after_ms: err.retry_after().as_millis() as u64,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidMapping(_) => Self::Validation(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
