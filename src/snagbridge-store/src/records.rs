//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routes events of one project to one channel.
///
/// Each filter list is optional: an empty list does not constrain its
/// dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub project_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub severities: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

impl RoutingRule {
    /// Unfiltered rule for a project.
    pub fn new(project_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            channel_id: channel_id.into(),
            environments: Vec::new(),
            severities: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Links a chat user to an error-tracker collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMapping {
    pub mm_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugsnag_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugsnag_email: Option<String>,
}

/// The one card that represents an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMapping {
    pub project_id: String,
    pub error_id: String,
    pub channel_id: String,
    pub post_id: String,
}

/// Registry entry for a card that the reconciliation loop keeps fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveError {
    pub project_id: String,
    pub error_id: String,
    pub channel_id: String,
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl ActiveError {
    pub fn same_error(&self, other: &ActiveError) -> bool {
        self.project_id == other.project_id && self.error_id == other.error_id
    }
}

impl From<&CardMapping> for ActiveError {
    fn from(mapping: &CardMapping) -> Self {
        Self {
            project_id: mapping.project_id.clone(),
            error_id: mapping.error_id.clone(),
            channel_id: mapping.channel_id.clone(),
            post_id: mapping.post_id.clone(),
            last_synced_at: None,
        }
    }
}
