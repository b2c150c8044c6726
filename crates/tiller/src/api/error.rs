//! API errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use tiller_protocol::{InvalidTransition, UnknownEventType};

use crate::bridge::RouterError;
use crate::events::LogError;
use crate::scheduler::SchedulerError;
use crate::session::RegistryError;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request data.
    #[error("{0}")]
    Validation(String),

    /// Unknown session, request, or resource.
    #[error("{0}")]
    NotFound(String),

    /// The session state machine rejected the operation.
    #[error("{0}")]
    InvalidTransition(String),

    /// The pending input queue is full.
    #[error("{0}")]
    QueueFull(String),

    /// The caller's resume cursor points before the retention window.
    #[error("{0}")]
    StaleCursor(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            ApiError::QueueFull(_) => (StatusCode::CONFLICT, "queue_full"),
            ApiError::StaleCursor(_) => (StatusCode::GONE, "stale_cursor"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ApiErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound(_) => Self::NotFound(err.to_string()),
            SchedulerError::InvalidTransition(_) => Self::InvalidTransition(err.to_string()),
            SchedulerError::QueueFull(_) => Self::QueueFull(err.to_string()),
            SchedulerError::EmptyInput(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::InvalidTransition(_) => Self::InvalidTransition(err.to_string()),
            RegistryError::QueueFull(_) => Self::QueueFull(err.to_string()),
        }
    }
}

impl From<LogError> for ApiError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::StaleCursor { .. } => Self::StaleCursor(err.to_string()),
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnknownPlatform(_) => Self::Validation(err.to_string()),
            RouterError::UnknownRequest(_) => Self::NotFound(err.to_string()),
        }
    }
}

impl From<InvalidTransition> for ApiError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidTransition(err.to_string())
    }
}

impl From<UnknownEventType> for ApiError {
    fn from(err: UnknownEventType) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ApiError::not_found("session sess_x not found");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let err: ApiError = LogError::StaleCursor {
            session_id: "s".to_string(),
            since_seq: 1,
            oldest: 5,
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::GONE);
    }
}
