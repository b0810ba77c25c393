//! Posts, channels and users as the REST API returns them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attachment::{self, Attachment};

/// A chat message. Replies carry the id of their thread root in `root_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

impl Post {
    pub fn new(channel_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// A reply in the thread rooted at `root_id`.
    pub fn reply(
        channel_id: impl Into<String>,
        root_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            root_id: root_id.into(),
            ..Self::new(channel_id, message)
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.set_attachments(&attachments);
        self
    }

    pub fn set_attachments(&mut self, attachments: &[Attachment]) {
        attachment::set_attachments(&mut self.props, attachments);
    }

    /// The card attachment, normalized from whatever shape props hold.
    pub fn first_attachment(&self) -> Option<Attachment> {
        attachment::first_attachment(&self.props)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}
