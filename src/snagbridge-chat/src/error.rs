//! Error types for the chat platform integration.

use thiserror::Error;

/// Errors that can occur talking to the chat platform.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Configuration error (missing or invalid config).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The platform answered with a non-success status.
    #[error("Mattermost API returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Platform error message, or the raw body.
        message: String,
    },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl ChatError {
    /// Whether the referenced post, channel or user does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout(err.to_string())
        } else if err.is_connect() {
            ChatError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ChatError::Json(err.to_string())
        } else {
            ChatError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Json(err.to_string())
    }
}

/// Result type for chat operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;
