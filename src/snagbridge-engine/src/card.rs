//! Card rendering.
//!
//! A card is a chat post whose message is the error title and whose single
//! attachment carries the details and the action buttons. The attachment
//! is also the card's state: status, assignee and error URL are read back
//! from it when a button press or a sync needs to re-render.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use snagbridge_bugsnag::ErrorDetails;
use snagbridge_chat::{Attachment, Post, PostAction};

use crate::event::{ErrorEvent, StackFrame};

pub const STATUS_FIXED: &str = "fixed";
pub const STATUS_IGNORED: &str = "ignored";

pub const FIELD_SEVERITY: &str = "Severity";
pub const FIELD_ENVIRONMENT: &str = "Environment";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_ASSIGNED: &str = "Assigned";
pub const FIELD_CONTEXT: &str = "Context";
pub const FIELD_APP_VERSION: &str = "App Version";
pub const FIELD_EVENTS: &str = "Events";
pub const FIELD_LAST_SEEN: &str = "Last seen";
pub const FIELD_PROJECT: &str = "Project";

/// Frames shown in the stack trace reply.
pub const MAX_STACK_FRAMES: usize = 15;

const DEFAULT_COLOR: &str = "#4949E4";
const SYNC_TRAILER: &str = "\n\nStatus: ";

/// Deployment-wide rendering inputs.
#[derive(Debug, Clone)]
pub struct CardSettings {
    /// URL the chat platform POSTs button presses to.
    pub actions_url: String,
    /// Shown in the footer when the event carries no project name.
    pub organization_id: Option<String>,
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            actions_url: "/plugins/com.mattermost.bugsnag/actions".to_string(),
            organization_id: None,
        }
    }
}

/// Card title, from the most specific information available.
pub fn card_title(event: &ErrorEvent) -> String {
    let class = event.exception_class.trim();
    let message = event.message.trim();
    match (class.is_empty(), message.is_empty()) {
        (false, false) => format!(":rotating_light: **{class}**: {message}"),
        (false, true) => format!(":rotating_light: **{class}**"),
        (true, false) => format!(":rotating_light: {message}"),
        (true, true) if !event.trigger.message.trim().is_empty() => {
            format!(":rotating_light: {}", event.trigger.message.trim())
        }
        (true, true) => ":rotating_light: Bugsnag error".to_string(),
    }
}

pub fn severity_color(severity: &str) -> &'static str {
    match severity.trim().to_lowercase().as_str() {
        "error" => "#D9534F",
        "warning" => "#F0AD4E",
        "info" => "#5BC0DE",
        _ => DEFAULT_COLOR,
    }
}

pub fn severity_emoji(severity: &str) -> &'static str {
    match severity.trim().to_lowercase().as_str() {
        "error" => "🔴",
        "warning" => "🟡",
        "info" => "🔵",
        _ => "⚪",
    }
}

fn footer(event: &ErrorEvent, settings: &CardSettings) -> String {
    let project = event.project_name.trim();
    if !project.is_empty() {
        return format!("Bugsnag • {project}");
    }
    match settings.organization_id.as_deref().map(str::trim) {
        Some(org) if !org.is_empty() => format!("Bugsnag • org {org}"),
        _ => "Bugsnag".to_string(),
    }
}

/// What the buttons of a card depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionState {
    pub project_id: String,
    pub error_id: String,
    pub error_url: String,
    pub status: String,
    /// Display label of the assignee (`@user` or an email), if any.
    pub assignee: Option<String>,
}

fn action_context(action: &str, state: &ActionState) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("action".into(), Value::from(action));
    context.insert("error_id".into(), Value::from(state.error_id.as_str()));
    context.insert("project_id".into(), Value::from(state.project_id.as_str()));
    context.insert("error_url".into(), Value::from(state.error_url.as_str()));
    context
}

/// Buttons for a card, always in the order assign, resolve, ignore, open.
pub fn build_actions(settings: &CardSettings, state: &ActionState) -> Vec<PostAction> {
    let url = settings.actions_url.as_str();
    let status = state.status.trim().to_lowercase();
    let mut actions = Vec::with_capacity(4);

    match state.assignee.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(assignee) => actions.push(
            PostAction::button("assigned", format!("Assigned to {assignee}"))
                .style("default")
                .disabled(true),
        ),
        None => actions.push(
            PostAction::button("assign_me", "Assign to me")
                .style("primary")
                .integration(url, action_context("assign_me", state)),
        ),
    }

    actions.push(
        PostAction::button("resolve", "✓ Resolve")
            .style("primary")
            .disabled(status == STATUS_FIXED)
            .integration(url, action_context("resolve", state)),
    );
    actions.push(
        PostAction::button("ignore", "✕ Ignore")
            .style("default")
            .disabled(status == STATUS_IGNORED)
            .integration(url, action_context("ignore", state)),
    );

    if !state.error_url.trim().is_empty() {
        actions.push(
            PostAction::button("open", "Open in Bugsnag")
                .style("link")
                .integration(url, action_context("open_in_browser", state)),
        );
    }

    actions
}

/// The card attachment for an event. `assignee` is the already resolved
/// display label of the assigned collaborator.
pub fn render_attachment(
    event: &ErrorEvent,
    assignee: Option<&str>,
    settings: &CardSettings,
) -> Attachment {
    let mut attachment = Attachment::new()
        .with_title(event.exception_class.trim(), event.error_url.as_str())
        .with_text(event.message.trim())
        .with_color(severity_color(&event.severity))
        .with_footer(footer(event, settings));
    attachment.fallback = card_title(event);

    let mut push = |title: &str, value: &str| {
        let value = value.trim();
        if !value.is_empty() {
            attachment.set_field(title, value);
        }
    };

    let severity = event.severity.trim();
    if !severity.is_empty() {
        push(FIELD_SEVERITY, &format!("{} {}", severity_emoji(severity), severity));
    }
    push(FIELD_ENVIRONMENT, &event.environment);
    push(FIELD_STATUS, &event.status);
    push(FIELD_ASSIGNED, assignee.unwrap_or_default());
    push(FIELD_CONTEXT, &event.context);
    push(FIELD_APP_VERSION, &event.app_version);
    if let Some(events) = event.events {
        push(FIELD_EVENTS, &events.to_string());
    }
    push(FIELD_LAST_SEEN, &event.received_at);
    push(FIELD_PROJECT, &event.project_name);

    let state = ActionState {
        project_id: event.project_id.clone(),
        error_id: event.error_id.clone(),
        error_url: event.error_url.clone(),
        status: event.status.clone(),
        assignee: assignee.map(str::to_string),
    };
    attachment.with_actions(build_actions(settings, &state))
}

/// A new card post for `channel_id`.
pub fn render_post(
    channel_id: &str,
    event: &ErrorEvent,
    assignee: Option<&str>,
    settings: &CardSettings,
) -> Post {
    Post::new(channel_id, card_title(event))
        .with_attachments(vec![render_attachment(event, assignee, settings)])
}

/// Overwrite an existing card with a fresh rendering of `event`.
pub fn refresh_post(post: &mut Post, event: &ErrorEvent, assignee: Option<&str>, settings: &CardSettings) {
    post.message = card_title(event);
    post.set_attachments(&[render_attachment(event, assignee, settings)]);
}

/// A change produced by a button press.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardChange {
    pub status: Option<String>,
    pub assignee: Option<String>,
}

impl CardChange {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            assignee: None,
        }
    }

    pub fn assignee(label: impl Into<String>) -> Self {
        Self {
            status: None,
            assignee: Some(label.into()),
        }
    }
}

/// Apply `change` to a card read back from the platform and rebuild its
/// buttons from the resulting state. Returns `false` when the post has no
/// usable attachment.
pub fn apply_change(
    post: &mut Post,
    project_id: &str,
    error_id: &str,
    change: &CardChange,
    settings: &CardSettings,
) -> bool {
    let Some(mut attachment) = post.first_attachment() else {
        return false;
    };

    if let Some(status) = &change.status {
        attachment.set_field(FIELD_STATUS, status.as_str());
    }
    if let Some(assignee) = &change.assignee {
        attachment.set_field(FIELD_ASSIGNED, assignee.as_str());
    }

    let state = ActionState {
        project_id: project_id.to_string(),
        error_id: error_id.to_string(),
        error_url: attachment.title_link.clone(),
        status: attachment
            .field_value(FIELD_STATUS)
            .unwrap_or_default()
            .to_string(),
        assignee: attachment
            .field_value(FIELD_ASSIGNED)
            .map(str::to_string)
            .filter(|a| !a.trim().is_empty()),
    };
    attachment.actions = build_actions(settings, &state);
    post.set_attachments(&[attachment]);
    true
}

/// Stack trace reply for a new card, or `None` without frames.
pub fn format_stacktrace(frames: &[StackFrame], max_frames: usize) -> Option<String> {
    if frames.is_empty() {
        return None;
    }
    let limit = if max_frames > 0 {
        frames.len().min(max_frames)
    } else {
        frames.len()
    };

    let mut out = String::from("**Stacktrace:**\n```\n");
    for frame in &frames[..limit] {
        let prefix = if frame.in_project { "→ " } else { "  " };
        let file = if frame.file.is_empty() { "<unknown>" } else { &frame.file };
        let method = if frame.method.is_empty() { "<anonymous>" } else { &frame.method };
        let line = frame
            .line_number
            .as_deref()
            .map(|l| format!(":{l}"))
            .unwrap_or_default();
        out.push_str(&format!("{prefix}{file}{line} in {method}\n"));
    }
    if frames.len() > limit {
        out.push_str(&format!("  ... and {} more frames\n", frames.len() - limit));
    }
    out.push_str("```");
    Some(out)
}

/// Audit reply for a repeat delivery of an existing error.
pub fn update_note(event: &ErrorEvent) -> Option<String> {
    if event.trigger.kind.trim().is_empty() {
        return None;
    }
    Some(format!("🔄 **Update**: {}", event.trigger.message.trim()))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Card message with the sync line for `details`. A line from a previous
/// sync is replaced, not stacked.
pub fn with_sync_line(message: &str, details: &ErrorDetails, now: DateTime<Utc>) -> String {
    let base = message
        .find(SYNC_TRAILER)
        .map_or(message, |index| &message[..index]);
    format!(
        "{base}{SYNC_TRAILER}{} | Events (total/24h): {}/{} | Last seen: {} | Synced: {}",
        details.status,
        details.events,
        details.events_last_24h,
        details.last_seen,
        rfc3339(now)
    )
}

/// Thread note posted after a successful sync.
pub fn sync_note(details: &ErrorDetails) -> String {
    format!(
        "[sync] Status: {}, events (total/24h): {}/{}, last seen: {}",
        details.status, details.events, details.events_last_24h, details.last_seen
    )
}
