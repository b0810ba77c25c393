//! Error types for the engine.

use std::time::Duration;

use snagbridge_bugsnag::BugsnagError;
use snagbridge_chat::ChatError;
use snagbridge_store::StoreError;
use thiserror::Error;

/// Errors produced while ingesting webhooks, handling actions or syncing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Webhook authentication is enabled and no token was supplied.
    #[error("missing webhook token")]
    MissingToken,

    /// Webhook token did not match.
    #[error("invalid webhook token")]
    InvalidToken,

    /// Request body did not decode or lacks the error identity.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Routing rules could not be read; nothing can be routed.
    #[error("cannot load channel mappings: {0}")]
    RulesUnavailable(#[source] StoreError),

    /// Ad-hoc destination does not exist on the chat platform.
    #[error("invalid channel_id: {0}")]
    InvalidChannel(String),

    /// Button press carried no action name.
    #[error("missing action")]
    MissingAction,

    /// Button press named an action this engine does not know.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The acting chat user could not be loaded.
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// Open-in-browser pressed on a card that has no error URL.
    #[error("no URL available")]
    NoUrl,

    /// A card mapping exists but the card carries no attachment to edit.
    #[error("card {0} has no attachment")]
    MalformedCard(String),

    /// An external call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Backend(#[from] BugsnagError),
}

impl EngineError {
    /// Whether the caller sent something unusable, as opposed to a failure
    /// on our side or in a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::MissingToken
                | EngineError::InvalidToken
                | EngineError::InvalidPayload(_)
                | EngineError::InvalidChannel(_)
                | EngineError::MissingAction
                | EngineError::UnsupportedAction(_)
                | EngineError::InvalidUser(_)
                | EngineError::NoUrl
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
