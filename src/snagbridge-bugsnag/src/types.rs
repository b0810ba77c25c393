//! Data Access API resource types.

use serde::{Deserialize, Deserializer, Serialize};

/// Reads an explicit `null` the same as a missing key.
///
/// Pair with `#[serde(default)]` so both cases yield `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

/// Current state of one error as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub project_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_class: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events_last_24h: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_seen: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_seen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Workflow operations accepted by the error status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusOperation {
    Open,
    Fix,
    Ignore,
    Snooze,
    Unsnooze,
}

impl StatusOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusOperation::Open => "open",
            StatusOperation::Fix => "fix",
            StatusOperation::Ignore => "ignore",
            StatusOperation::Snooze => "snooze",
            StatusOperation::Unsnooze => "unsnooze",
        }
    }

    /// Error status the API reports once the operation succeeded.
    pub fn resulting_status(&self) -> &'static str {
        match self {
            StatusOperation::Open | StatusOperation::Unsnooze => "open",
            StatusOperation::Fix => "fixed",
            StatusOperation::Ignore => "ignored",
            StatusOperation::Snooze => "snoozed",
        }
    }
}

impl std::fmt::Display for StatusOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
