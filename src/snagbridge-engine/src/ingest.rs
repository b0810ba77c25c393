//! Webhook ingestion: authenticate, route, and upsert one card per error.
//!
//! Each unique (project, error) pair owns exactly one card. The first
//! destination that creates it owns the mapping; later deliveries, and
//! other destinations of the same delivery, refresh that card instead of
//! posting a duplicate.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use snagbridge_chat::ChatPlatform;
use snagbridge_store::{ActiveError, CardMapping, CardStore, UserMapping};
use tracing::{debug, error, info, warn};

use crate::card::{self, CardSettings, MAX_STACK_FRAMES};
use crate::error::{EngineError, EngineResult};
use crate::event::ErrorEvent;
use crate::identity;
use crate::routing;

/// Shared-secret check for inbound webhooks.
#[derive(Clone, Default)]
pub struct WebhookAuth {
    expected: Option<String>,
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl WebhookAuth {
    /// The token takes precedence over the secret; if both are blank,
    /// authentication is disabled.
    pub fn new(token: Option<&str>, secret: Option<&str>) -> Self {
        let pick = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            expected: pick(token).or_else(|| pick(secret)),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Verify the token supplied with a delivery (query parameter first,
    /// then header; the caller picks).
    pub fn verify(&self, provided: Option<&str>) -> EngineResult<()> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        match provided.map(str::trim).filter(|p| !p.is_empty()) {
            None => Err(EngineError::MissingToken),
            Some(p) if p == expected => Ok(()),
            Some(_) => Err(EngineError::InvalidToken),
        }
    }
}

/// Result of one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Destinations whose card was created or refreshed.
    pub processed: usize,
    /// Destinations that failed; already logged.
    pub failed: usize,
}

/// What happened to the card for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardOutcome {
    Created { post_id: String },
    Updated { post_id: String },
    /// The card was already refreshed earlier in this delivery.
    AlreadyCurrent { post_id: String },
}

/// Turns decoded webhook events into cards.
#[derive(Clone)]
pub struct WebhookIngestor {
    store: CardStore,
    chat: Arc<dyn ChatPlatform>,
    settings: CardSettings,
}

impl WebhookIngestor {
    pub fn new(store: CardStore, chat: Arc<dyn ChatPlatform>, settings: CardSettings) -> Self {
        Self {
            store,
            chat,
            settings,
        }
    }

    /// Route `event` and upsert its card in every destination.
    ///
    /// `adhoc_channel` is an extra destination that bypasses rule filters;
    /// it is validated before anything is written. Per-destination failures
    /// are logged and counted, never returned.
    pub async fn ingest(
        &self,
        event: &ErrorEvent,
        adhoc_channel: Option<&str>,
    ) -> EngineResult<IngestReport> {
        if !event.has_identity() {
            return Err(EngineError::InvalidPayload(
                "missing project id or error id".to_string(),
            ));
        }

        let rules = self
            .store
            .routing_rules()
            .await
            .map_err(EngineError::RulesUnavailable)?;
        let mut destinations = routing::match_destinations(&rules, event);

        if let Some(channel) = adhoc_channel.map(str::trim).filter(|c| !c.is_empty()) {
            self.chat
                .get_channel(channel)
                .await
                .map_err(|e| EngineError::InvalidChannel(format!("{channel}: {e}")))?;
            if !destinations.iter().any(|d| d == channel) {
                destinations.push(channel.to_string());
            }
        }

        info!(
            project_id = %event.project_id,
            error_id = %event.error_id,
            destinations = destinations.len(),
            "Webhook event routed"
        );

        if destinations.is_empty() {
            return Ok(IngestReport::default());
        }

        let assignee = self.assignee_label(event).await;
        let mut refreshed: HashSet<String> = HashSet::new();
        let mut report = IngestReport::default();

        for channel_id in &destinations {
            match self
                .upsert_card(channel_id, event, assignee.as_deref(), &mut refreshed)
                .await
            {
                Ok(outcome) => {
                    debug!(channel_id = %channel_id, ?outcome, "Card upserted");
                    report.processed += 1;
                }
                Err(e) => {
                    error!(
                        channel_id = %channel_id,
                        project_id = %event.project_id,
                        error_id = %event.error_id,
                        "Failed to upsert card: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Display label of the event's assignee: `@username` when the
    /// collaborator maps to a chat user, else their email, name or id.
    async fn assignee_label(&self, event: &ErrorEvent) -> Option<String> {
        let collaborator = event.assigned.as_ref()?;

        let mappings: Vec<UserMapping> = match self.store.user_mappings().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to load user mappings: {}", e);
                Vec::new()
            }
        };

        if let Some(user_id) =
            identity::chat_user_for_collaborator(&mappings, &collaborator.id, &collaborator.email)
        {
            match self.chat.get_user(user_id).await {
                Ok(user) if !user.username.is_empty() => return Some(format!("@{}", user.username)),
                Ok(_) => {}
                Err(e) => warn!(user_id, "Failed to load mapped chat user: {}", e),
            }
        }

        [&collaborator.email, &collaborator.name, &collaborator.id]
            .into_iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Create or refresh the card for `event` in `channel_id`.
    ///
    /// Holds the card's lock for the whole read-create-persist sequence so
    /// concurrent deliveries of the same error cannot both create a card.
    pub async fn upsert_card(
        &self,
        channel_id: &str,
        event: &ErrorEvent,
        assignee: Option<&str>,
        refreshed: &mut HashSet<String>,
    ) -> EngineResult<CardOutcome> {
        let _guard = self.store.lock_card(&event.project_id, &event.error_id).await;

        if let Some(mapping) = self
            .store
            .card_mapping(&event.project_id, &event.error_id)
            .await?
        {
            if refreshed.contains(&mapping.post_id) {
                return Ok(CardOutcome::AlreadyCurrent {
                    post_id: mapping.post_id,
                });
            }

            let mut post = self.chat.get_post(&mapping.post_id).await?;
            card::refresh_post(&mut post, event, assignee, &self.settings);
            self.chat.update_post(post).await?;
            refreshed.insert(mapping.post_id.clone());

            if let Some(note) = card::update_note(event) {
                if let Err(e) = self
                    .chat
                    .create_reply(&mapping.channel_id, &mapping.post_id, &note)
                    .await
                {
                    warn!(post_id = %mapping.post_id, "Failed to post update note: {}", e);
                }
            }

            return Ok(CardOutcome::Updated {
                post_id: mapping.post_id,
            });
        }

        let created = self
            .chat
            .create_post(card::render_post(channel_id, event, assignee, &self.settings))
            .await?;

        let mapping = CardMapping {
            project_id: event.project_id.clone(),
            error_id: event.error_id.clone(),
            channel_id: channel_id.to_string(),
            post_id: created.id.clone(),
        };
        if let Err(e) = self.store.save_card_mapping(&mapping).await {
            error!(
                post_id = %created.id,
                "Card created but its mapping could not be stored; the next delivery will post a duplicate"
            );
            return Err(e.into());
        }
        refreshed.insert(created.id.clone());
        info!(
            project_id = %event.project_id,
            error_id = %event.error_id,
            channel_id,
            post_id = %created.id,
            "Card created"
        );

        if let Some(trace) = card::format_stacktrace(&event.frames, MAX_STACK_FRAMES) {
            if let Err(e) = self.chat.create_reply(channel_id, &created.id, &trace).await {
                warn!(post_id = %created.id, "Failed to post stack trace: {}", e);
            }
        }

        let entry = ActiveError {
            last_synced_at: Some(Utc::now()),
            ..ActiveError::from(&mapping)
        };
        if let Err(e) = self.store.upsert_active_error(entry).await {
            warn!(post_id = %created.id, "Failed to register active error: {}", e);
        }

        Ok(CardOutcome::Created {
            post_id: created.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Collaborator, StackFrame, TriggerInfo};
    use crate::testing::FakeChat;
    use snagbridge_chat::ChatUser;
    use snagbridge_store::RoutingRule;

    fn event() -> ErrorEvent {
        ErrorEvent {
            project_id: "p1".into(),
            project_name: "Checkout".into(),
            error_id: "e1".into(),
            exception_class: "TypeError".into(),
            message: "boom".into(),
            severity: "error".into(),
            status: "open".into(),
            environment: "production".into(),
            error_url: "https://app.bugsnag.com/e1".into(),
            ..Default::default()
        }
    }

    async fn setup(rules: Vec<RoutingRule>) -> (WebhookIngestor, CardStore, Arc<FakeChat>) {
        let store = CardStore::in_memory("test");
        store.save_routing_rules(&rules).await.unwrap();
        let chat = Arc::new(FakeChat::new());
        let ingestor = WebhookIngestor::new(store.clone(), chat.clone(), CardSettings::default());
        (ingestor, store, chat)
    }

    #[test]
    fn test_auth_precedence_and_trimming() {
        let auth = WebhookAuth::new(Some("  "), Some(" s3cret "));
        assert!(auth.is_enabled());
        assert!(auth.verify(Some("s3cret ")).is_ok());
        assert!(matches!(auth.verify(Some("nope")), Err(EngineError::InvalidToken)));
        assert!(matches!(auth.verify(None), Err(EngineError::MissingToken)));
        assert!(matches!(auth.verify(Some("   ")), Err(EngineError::MissingToken)));

        let auth = WebhookAuth::new(Some("tok"), Some("secret"));
        assert!(auth.verify(Some("tok")).is_ok());
        assert!(auth.verify(Some("secret")).is_err());
    }

    #[test]
    fn test_auth_disabled_accepts_anything() {
        let auth = WebhookAuth::new(None, Some(""));
        assert!(!auth.is_enabled());
        assert!(auth.verify(None).is_ok());
        assert!(auth.verify(Some("whatever")).is_ok());
    }

    #[tokio::test]
    async fn test_first_delivery_creates_card_mapping_and_registry_entry() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        let mut e = event();
        e.frames = vec![StackFrame {
            in_project: true,
            file: "cart.js".into(),
            ..Default::default()
        }];

        let report = ingestor.ingest(&e, None).await.unwrap();
        assert_eq!(report, IngestReport { processed: 1, failed: 0 });

        let mapping = store.card_mapping("p1", "e1").await.unwrap().unwrap();
        assert_eq!(mapping.channel_id, "c1");
        let post = chat.post(&mapping.post_id).unwrap();
        assert_eq!(post.message, ":rotating_light: **TypeError**: boom");

        let replies = chat.replies_to(&mapping.post_id);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("**Stacktrace:**"));

        let registry = store.active_errors().await.unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].post_id, mapping.post_id);
        assert!(registry[0].last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_repeat_delivery_updates_same_card() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        ingestor.ingest(&event(), None).await.unwrap();

        let mut again = event();
        again.status = "fixed".into();
        again.trigger = TriggerInfo {
            kind: "reopened".into(),
            message: "Error reopened".into(),
        };
        let report = ingestor.ingest(&again, None).await.unwrap();
        assert_eq!(report.processed, 1);

        assert_eq!(chat.card_count(), 1);
        let mapping = store.card_mapping("p1", "e1").await.unwrap().unwrap();
        let card = chat.post(&mapping.post_id).unwrap();
        let attachment = card.first_attachment().unwrap();
        assert_eq!(attachment.field_value("Status"), Some("fixed"));
        assert!(attachment.actions[1].disabled);
        assert_eq!(
            chat.replies_to(&mapping.post_id),
            vec!["🔄 **Update**: Error reopened".to_string()]
        );
        assert_eq!(store.active_errors().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_fanout_failure_still_counts_success() {
        let (ingestor, store, chat) = setup(vec![
            RoutingRule::new("p1", "broken"),
            RoutingRule::new("p1", "c2"),
        ])
        .await;
        chat.fail_create_in("broken");

        let report = ingestor.ingest(&event(), None).await.unwrap();
        assert_eq!(report, IngestReport { processed: 1, failed: 1 });

        let mapping = store.card_mapping("p1", "e1").await.unwrap().unwrap();
        assert_eq!(mapping.channel_id, "c2");
    }

    #[tokio::test]
    async fn test_fanout_shares_one_card_per_error() {
        let (ingestor, _store, chat) = setup(vec![
            RoutingRule::new("p1", "c1"),
            RoutingRule::new("p1", "c2"),
        ])
        .await;

        let report = ingestor.ingest(&event(), None).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(chat.card_count(), 1);
    }

    #[tokio::test]
    async fn test_no_matching_rule_is_not_an_error() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("other", "c1")]).await;
        let report = ingestor.ingest(&event(), None).await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert_eq!(chat.card_count(), 0);
        assert!(store.card_mapping("p1", "e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_adhoc_channel_bypasses_rules() {
        let (ingestor, store, chat) = setup(vec![]).await;
        chat.add_channel("adhoc");

        let report = ingestor.ingest(&event(), Some(" adhoc ")).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(
            store.card_mapping("p1", "e1").await.unwrap().unwrap().channel_id,
            "adhoc"
        );
    }

    #[tokio::test]
    async fn test_unknown_adhoc_channel_rejected_before_writes() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;

        let err = ingestor.ingest(&event(), Some("ghost")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidChannel(_)));
        assert_eq!(chat.card_count(), 0);
        assert!(store.active_errors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_identity_is_invalid_payload() {
        let (ingestor, _store, _chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        let mut e = event();
        e.error_id.clear();
        assert!(matches!(
            ingestor.ingest(&e, None).await,
            Err(EngineError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_assignee_rendered_as_mapped_username() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        store
            .save_user_mappings(&[UserMapping {
                mm_user_id: "u1".into(),
                bugsnag_user_id: Some("collab-1".into()),
                bugsnag_email: None,
            }])
            .await
            .unwrap();
        chat.add_user(ChatUser {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
        });

        let mut e = event();
        e.assigned = Some(Collaborator {
            id: "collab-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        });
        ingestor.ingest(&e, None).await.unwrap();

        let mapping = store.card_mapping("p1", "e1").await.unwrap().unwrap();
        let attachment = chat.post(&mapping.post_id).unwrap().first_attachment().unwrap();
        assert_eq!(attachment.field_value("Assigned"), Some("@ada"));
        assert_eq!(attachment.actions[0].name, "Assigned to @ada");
    }

    #[tokio::test]
    async fn test_unmapped_assignee_falls_back_to_email() {
        let (ingestor, store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        let mut e = event();
        e.assigned = Some(Collaborator {
            id: "collab-9".into(),
            name: "Lin".into(),
            email: "lin@example.com".into(),
        });
        ingestor.ingest(&e, None).await.unwrap();

        let mapping = store.card_mapping("p1", "e1").await.unwrap().unwrap();
        let attachment = chat.post(&mapping.post_id).unwrap().first_attachment().unwrap();
        assert_eq!(attachment.field_value("Assigned"), Some("lin@example.com"));
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_create_one_card() {
        let (ingestor, _store, chat) = setup(vec![RoutingRule::new("p1", "c1")]).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ingestor = ingestor.clone();
            handles.push(tokio::spawn(async move {
                ingestor.ingest(&event(), None).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().processed, 1);
        }
        assert_eq!(chat.card_count(), 1);
    }
}
