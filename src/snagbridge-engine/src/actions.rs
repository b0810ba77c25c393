//! Interactive button presses.
//!
//! A press is validated, turned into one call against the error tracker,
//! reflected on the card, and audited in the card's thread. These stages
//! run in order; a failed tracker call is reported in the returned note
//! instead of as an error.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use snagbridge_bugsnag::{ErrorBackend, StatusOperation};
use snagbridge_chat::{ChatPlatform, ChatUser};
use snagbridge_store::{CardMapping, CardStore, UserMapping};
use tracing::{info, warn};

use crate::card::{self, CardChange, CardSettings};
use crate::error::{EngineError, EngineResult};
use crate::identity;

/// Default bound on every external call made for one press.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(8);

/// Button press callback body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub context: ActionContext,
}

/// The context payload each button carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionContext {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub error_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub error_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    AssignMe,
    Resolve,
    Ignore,
    OpenInBrowser,
}

impl CardAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardAction::AssignMe => "assign_me",
            CardAction::Resolve => "resolve",
            CardAction::Ignore => "ignore",
            CardAction::OpenInBrowser => "open_in_browser",
        }
    }

    fn status_operation(&self) -> Option<StatusOperation> {
        match self {
            CardAction::Resolve => Some(StatusOperation::Fix),
            CardAction::Ignore => Some(StatusOperation::Ignore),
            _ => None,
        }
    }
}

impl FromStr for CardAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(EngineError::MissingAction),
            "assign_me" => Ok(CardAction::AssignMe),
            "resolve" => Ok(CardAction::Resolve),
            "ignore" => Ok(CardAction::Ignore),
            "open_in_browser" => Ok(CardAction::OpenInBrowser),
            other => Err(EngineError::UnsupportedAction(other.to_string())),
        }
    }
}

/// How a press was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Human-readable summary. `card_updated` is false when the tracker
    /// was changed (or not) without refreshing any card.
    Note { text: String, card_updated: bool },
    /// Tell the client to open `url`.
    Navigate { url: String },
}

/// Handles button presses.
#[derive(Clone)]
pub struct ActionHandler {
    store: CardStore,
    chat: Arc<dyn ChatPlatform>,
    backend: Option<Arc<dyn ErrorBackend>>,
    settings: CardSettings,
    timeout: Duration,
}

impl ActionHandler {
    pub fn new(
        store: CardStore,
        chat: Arc<dyn ChatPlatform>,
        backend: Option<Arc<dyn ErrorBackend>>,
        settings: CardSettings,
    ) -> Self {
        Self {
            store,
            chat,
            backend,
            settings,
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, E>(&self, call: impl Future<Output = Result<T, E>>) -> EngineResult<T>
    where
        EngineError: From<E>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Timeout(self.timeout)),
        }
    }

    pub async fn handle(&self, request: &ActionRequest) -> EngineResult<ActionOutcome> {
        let context = &request.context;
        let action: CardAction = context.action.parse()?;

        if action == CardAction::OpenInBrowser {
            let url = context.error_url.trim();
            if url.is_empty() {
                return Err(EngineError::NoUrl);
            }
            return Ok(ActionOutcome::Navigate {
                url: url.to_string(),
            });
        }

        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(EngineError::InvalidUser("missing user id".to_string()));
        }
        let user = self
            .bounded(self.chat.get_user(user_id))
            .await
            .map_err(|e| EngineError::InvalidUser(format!("{user_id}: {e}")))?;
        let handle = if user.username.is_empty() {
            user.id.clone()
        } else {
            format!("@{}", user.username)
        };

        let mappings: Vec<UserMapping> = match self.store.user_mappings().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to load user mappings: {}", e);
                Vec::new()
            }
        };
        let mapping = identity::resolve_chat_user(&mappings, &user);

        let mut parts = vec![format!("{handle} requested action \"{}\"", action.as_str())];
        if let Some(mapping) = mapping {
            parts.push(format!(
                "mapped to Bugsnag user {}",
                identity::identity_label(mapping)
            ));
        }
        if !context.error_url.trim().is_empty() {
            parts.push(format!("source: {}", context.error_url.trim()));
        }

        let Some(backend) = &self.backend else {
            parts.push("Bugsnag client unavailable; nothing was changed".to_string());
            return Ok(ActionOutcome::Note {
                text: parts.join(" · "),
                card_updated: false,
            });
        };

        let (result, change) = self
            .apply_to_backend(backend.as_ref(), action, context, &user, &handle, mapping)
            .await;
        parts.push(result);

        let card = match self.store.card_mapping(&context.project_id, &context.error_id).await {
            Ok(card) => card,
            Err(e) => {
                warn!(
                    project_id = %context.project_id,
                    error_id = %context.error_id,
                    "Failed to load card mapping: {}",
                    e
                );
                None
            }
        };

        let Some(card) = card else {
            parts.push("no card to update".to_string());
            return Ok(ActionOutcome::Note {
                text: parts.join(" · "),
                card_updated: false,
            });
        };

        let mut card_updated = false;
        if let Some(change) = change {
            match self.update_card(&card, &change).await {
                Ok(()) => card_updated = true,
                Err(e) => {
                    warn!(post_id = %card.post_id, "Failed to update card after action: {}", e);
                    parts.push("card could not be updated".to_string());
                    return Ok(ActionOutcome::Note {
                        text: parts.join(" · "),
                        card_updated: false,
                    });
                }
            }
        }

        let text = parts.join(" · ");
        if let Err(e) = self
            .bounded(self.chat.create_reply(&card.channel_id, &card.post_id, &text))
            .await
        {
            warn!(post_id = %card.post_id, "Failed to post action audit reply: {}", e);
        }

        Ok(ActionOutcome::Note { text, card_updated })
    }

    /// Perform the tracker call for `action`. Returns the note fragment and
    /// the card change to apply when the call succeeded.
    async fn apply_to_backend(
        &self,
        backend: &dyn ErrorBackend,
        action: CardAction,
        context: &ActionContext,
        user: &ChatUser,
        handle: &str,
        mapping: Option<&UserMapping>,
    ) -> (String, Option<CardChange>) {
        let project_id = context.project_id.as_str();
        let error_id = context.error_id.as_str();

        if let Some(operation) = action.status_operation() {
            return match self
                .bounded(backend.update_status(project_id, error_id, operation))
                .await
            {
                Ok(()) => {
                    let status = operation.resulting_status();
                    info!(project_id, error_id, user_id = %user.id, %operation, "Error status changed");
                    (
                        format!("status set to {status} in Bugsnag"),
                        Some(CardChange::status(status)),
                    )
                }
                Err(e) => {
                    warn!(project_id, error_id, %operation, "Status update failed: {}", e);
                    (format!("Bugsnag status update failed: {e}"), None)
                }
            };
        }

        let Some(assignee) = mapping.and_then(identity::assignee_identity) else {
            return ("no Bugsnag mapping available for assignment".to_string(), None);
        };
        match self
            .bounded(backend.assign_error(project_id, error_id, &assignee))
            .await
        {
            Ok(()) => {
                info!(project_id, error_id, user_id = %user.id, "Error assigned");
                (
                    format!("assigned to {assignee} in Bugsnag"),
                    Some(CardChange::assignee(handle)),
                )
            }
            Err(e) => {
                warn!(project_id, error_id, "Assignment failed: {}", e);
                (format!("Bugsnag assign failed: {e}"), None)
            }
        }
    }

    async fn update_card(&self, card: &CardMapping, change: &CardChange) -> EngineResult<()> {
        let _guard = self.store.lock_card(&card.project_id, &card.error_id).await;
        let mut post = self.bounded(self.chat.get_post(&card.post_id)).await?;
        if !card::apply_change(
            &mut post,
            &card.project_id,
            &card.error_id,
            change,
            &self.settings,
        ) {
            return Err(EngineError::MalformedCard(card.post_id.clone()));
        }
        self.bounded(self.chat.update_post(post)).await?;
        Ok(())
    }
}
