//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use snagbridge_engine::{CardSettings, WebhookAuth};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SNAGBRIDGE_";

/// Shortest non-zero reconciliation interval accepted.
pub const MIN_SYNC_INTERVAL_SECS: u64 = 10;

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

fn redacted(secret: &Option<SecretString>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

/// Server configuration.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8065").
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub bugsnag: BugsnagConfig,

    #[serde(default)]
    pub mattermost: MattermostConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    /// URL the chat platform calls when a card button is pressed.
    #[serde(default = "default_actions_url")]
    pub actions_url: String,

    /// Reconciliation interval in seconds; 0 disables the loop.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Bound on each external call made while handling a button press.
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8065".to_string()
}

fn default_actions_url() -> String {
    CardSettings::default().actions_url
}

fn default_sync_interval() -> u64 {
    300
}

fn default_action_timeout() -> u64 {
    8
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage: StorageConfig::default(),
            bugsnag: BugsnagConfig::default(),
            mattermost: MattermostConfig::default(),
            webhook: WebhookConfig::default(),
            actions_url: default_actions_url(),
            sync_interval_secs: default_sync_interval(),
            action_timeout_secs: default_action_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("storage", &self.storage)
            .field("bugsnag", &self.bugsnag)
            .field("mattermost", &self.mattermost)
            .field("webhook", &self.webhook)
            .field("actions_url", &self.actions_url)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("action_timeout_secs", &self.action_timeout_secs)
            .field("logging", &self.logging)
            .finish()
    }
}

impl ServerConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from `SNAGBRIDGE_*` environment
    /// variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self::from_lookup(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from a variable lookup; `lookup` receives names without the
    /// prefix (e.g. `LISTEN_ADDR`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret_var = |name: &str| var(name).map(SecretString::from);

        if let Some(addr) = var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(dir) = var("DATA_DIR") {
            config.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(namespace) = var("NAMESPACE") {
            config.storage.namespace = namespace;
        }

        config.bugsnag.api_token = secret_var("BUGSNAG_TOKEN");
        if let Some(url) = var("BUGSNAG_BASE_URL") {
            config.bugsnag.base_url = url;
        }
        config.bugsnag.organization_id = var("BUGSNAG_ORGANIZATION_ID");

        if let Some(url) = var("MATTERMOST_URL") {
            config.mattermost.base_url = url;
        }
        config.mattermost.bot_token = secret_var("MATTERMOST_TOKEN");
        if let Some(id) = var("BOT_USER_ID") {
            config.mattermost.bot_user_id = id;
        }

        config.webhook.token = secret_var("WEBHOOK_TOKEN");
        config.webhook.secret = secret_var("WEBHOOK_SECRET");

        if let Some(url) = var("ACTIONS_URL") {
            config.actions_url = url;
        }
        if let Some(secs) = var("SYNC_INTERVAL_SECS") {
            config.sync_interval_secs = secs
                .parse()
                .with_context(|| format!("{ENV_PREFIX}SYNC_INTERVAL_SECS: invalid number {secs:?}"))?;
        }
        if let Some(secs) = var("ACTION_TIMEOUT_SECS") {
            config.action_timeout_secs = secs
                .parse()
                .with_context(|| format!("{ENV_PREFIX}ACTION_TIMEOUT_SECS: invalid number {secs:?}"))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen_addr {:?}", self.listen_addr))?;
        url::Url::parse(&self.mattermost.base_url)
            .with_context(|| format!("invalid mattermost.base_url {:?}", self.mattermost.base_url))?;
        url::Url::parse(&self.bugsnag.base_url)
            .with_context(|| format!("invalid bugsnag.base_url {:?}", self.bugsnag.base_url))?;

        if self.sync_interval_secs != 0 && self.sync_interval_secs < MIN_SYNC_INTERVAL_SECS {
            bail!(
                "sync_interval_secs must be 0 (disabled) or at least {MIN_SYNC_INTERVAL_SECS}, got {}",
                self.sync_interval_secs
            );
        }
        if self.action_timeout_secs == 0 {
            bail!("action_timeout_secs must be positive");
        }
        if self.bugsnag.request_timeout_secs == 0 || self.mattermost.request_timeout_secs == 0 {
            bail!("request timeouts must be positive");
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn webhook_auth(&self) -> WebhookAuth {
        let expose = |s: &Option<SecretString>| s.as_ref().map(|s| s.expose_secret().to_string());
        let token = expose(&self.webhook.token);
        let secret = expose(&self.webhook.secret);
        WebhookAuth::new(token.as_deref(), secret.as_deref())
    }

    pub fn card_settings(&self) -> CardSettings {
        CardSettings {
            actions_url: self.actions_url.clone(),
            organization_id: self.bugsnag.organization_id.clone(),
        }
    }
}

/// Where state is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Key prefix separating this deployment's records.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Directory for the file-backed store; absent keeps state in memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_namespace() -> String {
    snagbridge_store::DEFAULT_NAMESPACE.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            data_dir: None,
        }
    }
}

/// Error tracker API access.
#[derive(Clone, Deserialize)]
pub struct BugsnagConfig {
    /// Data Access API token; without it actions and sync are disabled.
    #[serde(default, deserialize_with = "secret")]
    pub api_token: Option<SecretString>,
    #[serde(default = "default_bugsnag_url")]
    pub base_url: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default = "default_bugsnag_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bugsnag_url() -> String {
    snagbridge_bugsnag::DEFAULT_BASE_URL.to_string()
}

fn default_bugsnag_timeout() -> u64 {
    10
}

impl Default for BugsnagConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: default_bugsnag_url(),
            organization_id: None,
            request_timeout_secs: default_bugsnag_timeout(),
        }
    }
}

impl std::fmt::Debug for BugsnagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugsnagConfig")
            .field("api_token", &redacted(&self.api_token))
            .field("base_url", &self.base_url)
            .field("organization_id", &self.organization_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Chat platform API access.
#[derive(Clone, Deserialize)]
pub struct MattermostConfig {
    #[serde(default = "default_mattermost_url")]
    pub base_url: String,
    #[serde(default, deserialize_with = "secret")]
    pub bot_token: Option<SecretString>,
    #[serde(default)]
    pub bot_user_id: String,
    #[serde(default = "default_mattermost_timeout")]
    pub request_timeout_secs: u64,
}

fn default_mattermost_url() -> String {
    "http://localhost:8065".to_string()
}

fn default_mattermost_timeout() -> u64 {
    10
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            base_url: default_mattermost_url(),
            bot_token: None,
            bot_user_id: String::new(),
            request_timeout_secs: default_mattermost_timeout(),
        }
    }
}

impl std::fmt::Debug for MattermostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostConfig")
            .field("base_url", &self.base_url)
            .field("bot_token", &redacted(&self.bot_token))
            .field("bot_user_id", &self.bot_user_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Shared secret expected on inbound webhooks. `token` wins over `secret`.
#[derive(Clone, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default, deserialize_with = "secret")]
    pub token: Option<SecretString>,
    #[serde(default, deserialize_with = "secret")]
    pub secret: Option<SecretString>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("token", &redacted(&self.token))
            .field("secret", &redacted(&self.secret))
            .finish()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
