//! Message attachments and interactive buttons.
//!
//! Attachments are stored inside a post's free-form `props`, so a post read
//! back from the server may carry them in several shapes: an array of
//! objects (the normal case), a lone object, or a JSON-encoded string. Field
//! values may be strings, numbers or booleans. [`first_attachment`] is the
//! single place that turns any of these into a typed [`Attachment`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Props key holding the attachment list.
pub const ATTACHMENTS_PROP: &str = "attachments";

/// A rich message attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub fallback: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub color: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub title_link: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "lenient_list")]
    pub fields: Vec<AttachmentField>,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub footer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "lenient_list")]
    pub actions: Vec<PostAction>,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>, link: impl Into<String>) -> Self {
        self.title = title.into();
        self.title_link = link.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = footer.into();
        self
    }

    /// Append a short (half-width) field.
    pub fn short_field(mut self, title: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AttachmentField {
            title: title.into(),
            value: value.into(),
            short: true,
        });
        self
    }

    pub fn with_actions(mut self, actions: Vec<PostAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn field(&self, title: &str) -> Option<&AttachmentField> {
        self.fields.iter().find(|f| f.title == title)
    }

    pub fn field_value(&self, title: &str) -> Option<&str> {
        self.field(title).map(|f| f.value.as_str())
    }

    /// Replace the value of a field, appending it if absent.
    pub fn set_field(&mut self, title: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.title == title) {
            Some(field) => field.value = value,
            None => self.fields.push(AttachmentField {
                title: title.to_string(),
                value,
                short: true,
            }),
        }
    }
}

/// One titled value inside an attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentField {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub short: bool,
}

/// An interactive button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAction {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "type", default = "default_action_type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient_string")]
    pub style: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<ActionIntegration>,
}

fn default_action_type() -> String {
    "button".to_string()
}

impl PostAction {
    pub fn button(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action_type: default_action_type(),
            style: String::new(),
            disabled: false,
            integration: None,
        }
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Where the platform POSTs the press, and the context it echoes back.
    pub fn integration(mut self, url: impl Into<String>, context: Map<String, Value>) -> Self {
        self.integration = Some(ActionIntegration {
            url: url.into(),
            context,
        });
        self
    }
}

/// Callback target of a button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntegration {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// First attachment stored in a post's props, whatever shape it was saved in.
pub fn first_attachment(props: &Map<String, Value>) -> Option<Attachment> {
    props.get(ATTACHMENTS_PROP).and_then(attachment_from_value)
}

fn attachment_from_value(value: &Value) -> Option<Attachment> {
    match value {
        Value::Array(items) => items.first().and_then(attachment_from_value),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .ok()
            .as_ref()
            .and_then(attachment_from_value),
        _ => None,
    }
}

/// Store `attachments` in props, replacing whatever was there.
pub fn set_attachments(props: &mut Map<String, Value>, attachments: &[Attachment]) {
    let value = serde_json::to_value(attachments).unwrap_or(Value::Array(Vec::new()));
    props.insert(ATTACHMENTS_PROP.to_string(), value);
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(ATTACHMENTS_PROP.to_string(), value);
        map
    }

    fn sample() -> Attachment {
        Attachment::new()
            .with_title("TypeError", "https://app.bugsnag.com/e/1")
            .with_color("#D9534F")
            .short_field("Status", "open")
            .with_actions(vec![
                PostAction::button("resolve", "✓ Resolve").style("primary"),
            ])
    }

    #[test]
    fn test_array_shape() {
        let mut map = Map::new();
        set_attachments(&mut map, &[sample()]);
        assert_eq!(first_attachment(&map), Some(sample()));
    }

    #[test]
    fn test_single_object_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(first_attachment(&props(value)), Some(sample()));
    }

    #[test]
    fn test_json_string_shape() {
        let encoded = serde_json::to_string(&vec![sample()]).unwrap();
        assert_eq!(first_attachment(&props(Value::String(encoded))), Some(sample()));
    }

    #[test]
    fn test_loose_field_types() {
        let value = json!([{
            "title": "Crash",
            "fields": [
                {"title": "Events", "value": 42, "short": "true"},
                {"title": "Handled", "value": false, "short": 0},
                {"title": "Empty", "value": null},
                "garbage"
            ],
            "actions": [{"id": "ignore", "name": "Ignore", "disabled": "true"}]
        }]);
        let attachment = first_attachment(&props(value)).unwrap();

        assert_eq!(attachment.fields.len(), 3);
        assert_eq!(attachment.field_value("Events"), Some("42"));
        assert!(attachment.fields[0].short);
        assert_eq!(attachment.field_value("Handled"), Some("false"));
        assert!(!attachment.fields[1].short);
        assert_eq!(attachment.field_value("Empty"), Some(""));
        assert!(attachment.actions[0].disabled);
        assert_eq!(attachment.actions[0].action_type, "button");
    }

    #[test]
    fn test_missing_or_unusable() {
        assert!(first_attachment(&Map::new()).is_none());
        assert!(first_attachment(&props(json!([]))).is_none());
        assert!(first_attachment(&props(json!(17))).is_none());
        assert!(first_attachment(&props(json!("not json"))).is_none());
    }

    #[test]
    fn test_set_field_replaces_or_appends() {
        let mut attachment = sample();
        attachment.set_field("Status", "fixed");
        attachment.set_field("Assigned", "@ada");
        assert_eq!(attachment.field_value("Status"), Some("fixed"));
        assert_eq!(attachment.field_value("Assigned"), Some("@ada"));
        assert_eq!(attachment.fields.len(), 2);
    }
}
