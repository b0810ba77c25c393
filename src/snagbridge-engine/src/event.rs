//! Inbound webhook payload and its normalized form.
//!
//! The error tracker posts a nested document (trigger, project, error, app,
//! exceptions...). [`ErrorEvent`] flattens the parts the engine uses so the
//! rest of the crate never walks optional nesting.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snagbridge_bugsnag::null_as_default;

/// Webhook body as delivered by the error tracker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger: TriggerInfo,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub project: Option<ProjectInfo>,
    #[serde(default)]
    pub account: Option<AccountInfo>,
}

/// Why the webhook fired (first occurrence, spike, reopen...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TriggerInfo {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Id of this particular event; the error itself is `error_id`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exception_class: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub received_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unhandled: bool,
    #[serde(default)]
    pub events: Option<u64>,
    #[serde(rename = "assigned_collaborator", default)]
    pub assigned_collaborator: Option<Collaborator>,
    #[serde(default)]
    pub app: Option<AppInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exceptions: Vec<ExceptionInfo>,
    /// Legacy location of the frames, still sent by some integrations.
    #[serde(default, deserialize_with = "null_as_default")]
    pub stack_trace: Vec<StackFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Collaborator {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_stage: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_class: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stacktrace: Vec<StackFrame>,
}

/// One frame of a stack trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, deserialize_with = "null_as_default")]
    pub in_project: bool,
    /// Sent as a number or a string depending on the notifier.
    #[serde(default, deserialize_with = "number_or_string")]
    pub line_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// The flattened view of one error occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorEvent {
    pub project_id: String,
    pub project_name: String,
    pub error_id: String,
    pub exception_class: String,
    pub message: String,
    pub context: String,
    pub severity: String,
    pub status: String,
    pub environment: String,
    pub app_version: String,
    pub error_url: String,
    pub received_at: String,
    pub events: Option<u64>,
    pub unhandled: bool,
    pub assigned: Option<Collaborator>,
    pub trigger: TriggerInfo,
    pub frames: Vec<StackFrame>,
}

impl ErrorEvent {
    /// Decode a webhook body.
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<WebhookPayload>(body).map(Self::from)
    }

    /// Event type used by routing filters.
    pub fn event_type(&self) -> &str {
        &self.trigger.kind
    }

    pub fn has_identity(&self) -> bool {
        !self.project_id.trim().is_empty() && !self.error_id.trim().is_empty()
    }
}

fn trimmed(s: String) -> String {
    s.trim().to_string()
}

impl From<WebhookPayload> for ErrorEvent {
    fn from(payload: WebhookPayload) -> Self {
        let project = payload.project.unwrap_or_default();
        let error = payload.error.unwrap_or_default();
        let app = error.app.unwrap_or_default();

        let mut exceptions = error.exceptions.into_iter();
        let first = exceptions.next().filter(|e| !e.stacktrace.is_empty());
        let frames = match first {
            Some(exception) => exception.stacktrace,
            None => error.stack_trace,
        };

        let assigned = error.assigned_collaborator.filter(|c| {
            !(c.id.trim().is_empty() && c.email.trim().is_empty() && c.name.trim().is_empty())
        });

        Self {
            project_id: trimmed(project.id),
            project_name: project.name,
            error_id: trimmed(error.error_id),
            exception_class: error.exception_class,
            message: error.message,
            context: error.context,
            severity: error.severity,
            status: error.status,
            environment: app.release_stage,
            app_version: app.version,
            error_url: trimmed(error.url),
            received_at: error.received_at,
            events: error.events,
            unhandled: error.unhandled,
            assigned,
            trigger: payload.trigger,
            frames,
        }
    }
}
