//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use snagbridge_bugsnag::{BugsnagClient, ClientOptions, ErrorBackend};
use snagbridge_chat::{ChatPlatform, MattermostClient};
use snagbridge_engine::{ActionHandler, SyncSupervisor, SyncWorker, WebhookAuth, WebhookIngestor};
use snagbridge_store::{CardStore, FileKv, Namespaced};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Everything a handler needs.
pub struct AppState {
    pub store: CardStore,
    pub ingestor: WebhookIngestor,
    pub actions: ActionHandler,
    pub sync: SyncSupervisor,
    webhook_auth: RwLock<WebhookAuth>,
    chat: Arc<dyn ChatPlatform>,
    backend: Option<Arc<dyn ErrorBackend>>,
    organization_id: Option<String>,
    start_time: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend_configured", &self.backend.is_some())
            .field("start_time", &self.start_time)
            .finish()
    }
}

impl AppState {
    /// Assemble state from already constructed collaborators.
    pub fn new(
        config: &ServerConfig,
        store: CardStore,
        chat: Arc<dyn ChatPlatform>,
        backend: Option<Arc<dyn ErrorBackend>>,
    ) -> Self {
        let settings = config.card_settings();
        let ingestor = WebhookIngestor::new(store.clone(), chat.clone(), settings.clone());
        let actions = ActionHandler::new(store.clone(), chat.clone(), backend.clone(), settings)
            .with_timeout(config.action_timeout());

        Self {
            store,
            ingestor,
            actions,
            sync: SyncSupervisor::new(),
            webhook_auth: RwLock::new(config.webhook_auth()),
            chat,
            backend,
            organization_id: config
                .bugsnag
                .organization_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            start_time: Instant::now(),
        }
    }

    /// Build the store and API clients described by `config`.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = match &config.storage.data_dir {
            Some(dir) => {
                let kv = FileKv::new(dir);
                kv.init()
                    .await
                    .with_context(|| format!("initializing data dir {}", dir.display()))?;
                info!(data_dir = %dir.display(), "Using file-backed store");
                CardStore::new(Arc::new(Namespaced::new(kv, config.storage.namespace.as_str())))
            }
            None => {
                warn!("No data_dir configured; card mappings will not survive a restart");
                CardStore::in_memory(&config.storage.namespace)
            }
        };

        let token = config
            .mattermost
            .bot_token
            .clone()
            .context("mattermost.bot_token is required")?;
        let chat = MattermostClient::new(
            &config.mattermost.base_url,
            token,
            Duration::from_secs(config.mattermost.request_timeout_secs),
        )?;

        let backend: Option<Arc<dyn ErrorBackend>> = match config.bugsnag.api_token.clone() {
            Some(token) => {
                let client = BugsnagClient::with_options(
                    token,
                    ClientOptions {
                        base_url: config.bugsnag.base_url.clone(),
                        timeout: Duration::from_secs(config.bugsnag.request_timeout_secs),
                    },
                )?;
                Some(Arc::new(client) as Arc<dyn ErrorBackend>)
            }
            None => {
                warn!("No Bugsnag API token configured; actions and reconciliation are disabled");
                None
            }
        };

        Ok(Self::new(config, store, Arc::new(chat), backend))
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn backend(&self) -> Option<&Arc<dyn ErrorBackend>> {
        self.backend.as_ref()
    }

    /// Organization configured for admin listings, if any.
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    pub async fn webhook_auth(&self) -> WebhookAuth {
        self.webhook_auth.read().await.clone()
    }

    fn sync_worker(&self) -> Option<Arc<SyncWorker>> {
        let backend = self.backend.clone()?;
        Some(Arc::new(SyncWorker::new(
            self.store.clone(),
            self.chat.clone(),
            backend,
        )))
    }

    /// (Re)start reconciliation at `interval`. Returns whether a loop runs.
    pub async fn start_sync(&self, interval: Duration) -> bool {
        match self.sync_worker() {
            Some(worker) => self.sync.restart(worker, interval).await,
            None => {
                self.sync.stop().await;
                false
            }
        }
    }

    /// Apply the settings that can change without a restart: webhook
    /// credentials and the reconciliation interval.
    pub async fn reload(&self, config: &ServerConfig) -> bool {
        let auth = config.webhook_auth();
        if !auth.is_enabled() {
            warn!("Webhook authentication is disabled after reload");
        }
        *self.webhook_auth.write().await = auth;
        let running = self.start_sync(config.sync_interval()).await;
        info!(sync_running = running, "Configuration reloaded");
        running
    }

    pub async fn shutdown(&self) {
        self.sync.stop().await;
    }
}
