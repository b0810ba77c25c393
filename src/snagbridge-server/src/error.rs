//! Error types for the server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use snagbridge_bugsnag::BugsnagError;
use snagbridge_engine::EngineError;
use snagbridge_store::StoreError;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Webhook token missing or wrong.
    #[error("{0}")]
    Unauthorized(String),

    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),

    /// Request body decoded but failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The error tracker rejected or failed a read-through call.
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// A required collaborator is not configured.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A collaborator did not answer in time.
    #[error("Request timeout")]
    Timeout,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::Validation(_) => "validation_error",
            Self::BadGateway(_) => "bad_gateway",
            Self::Unavailable(_) => "service_unavailable",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        match &error {
            EngineError::MissingToken | EngineError::InvalidToken => {
                Self::Unauthorized(error.to_string())
            }
            EngineError::Timeout(_) => Self::Timeout,
            e if e.is_client_error() => Self::BadRequest(error.to_string()),
            _ => Self::Internal(error.to_string()),
        }
    }
}

impl From<BugsnagError> for AppError {
    fn from(error: BugsnagError) -> Self {
        match error {
            BugsnagError::Timeout(_) => Self::Timeout,
            other => Self::BadGateway(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        Self::Internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let err = AppError::from(EngineError::InvalidToken);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "invalid webhook token");

        let err = AppError::from(EngineError::UnsupportedAction("dance".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "bad_request");

        let err = AppError::from(EngineError::RulesUnavailable(StoreError::Backend(
            "disk gone".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_backend_error_mapping() {
        let err = AppError::from(BugsnagError::Status {
            status: 401,
            body: "bad token".into(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::from(BugsnagError::Timeout("slow".into())).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Timeout.error_code(), "timeout");
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
