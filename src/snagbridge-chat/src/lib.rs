//! Mattermost integration for snagbridge.
//!
//! - [`Post`], [`Attachment`] and [`PostAction`]: the message model, with
//!   interactive buttons
//! - [`ChatPlatform`]: the operations the bridge performs on the chat side
//! - [`MattermostClient`]: the REST API v4 implementation
//!
//! Attachments read back from the server go through
//! [`attachment::first_attachment`], which accepts every shape the server
//! stores them in.

pub mod attachment;
pub mod client;
pub mod error;
pub mod platform;
pub mod post;

pub use attachment::{ActionIntegration, Attachment, AttachmentField, PostAction};
pub use client::MattermostClient;
pub use error::{ChatError, ChatResult};
pub use platform::ChatPlatform;
pub use post::{Channel, ChatUser, Post};
