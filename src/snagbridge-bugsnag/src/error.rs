//! Error types for the Bugsnag client.

use thiserror::Error;

/// Errors returned by [`crate::ErrorBackend`] implementations.
#[derive(Error, Debug)]
pub enum BugsnagError {
    /// Configuration error (missing token, bad base URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller passed an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The API answered with a non-success status.
    #[error("bugsnag API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Response body did not decode.
    #[error("JSON error: {0}")]
    Json(String),
}

impl BugsnagError {
    /// HTTP status code when the API rejected the request.
    pub fn status(&self) -> Option<u16> {
        match self {
            BugsnagError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BugsnagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BugsnagError::Timeout(err.to_string())
        } else if err.is_connect() {
            BugsnagError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            BugsnagError::Json(err.to_string())
        } else {
            BugsnagError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BugsnagError {
    fn from(err: serde_json::Error) -> Self {
        BugsnagError::Json(err.to_string())
    }
}

/// Result type for Bugsnag operations.
pub type BugsnagResult<T> = std::result::Result<T, BugsnagError>;
