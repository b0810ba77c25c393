//! The chat-platform seam.

use async_trait::async_trait;

use crate::error::ChatResult;
use crate::post::{Channel, ChatUser, Post};

/// Operations the bridge needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Create a post; returns it with its server-assigned id.
    async fn create_post(&self, post: Post) -> ChatResult<Post>;

    /// Overwrite an existing post (matched by `post.id`).
    async fn update_post(&self, post: Post) -> ChatResult<Post>;

    async fn get_post(&self, post_id: &str) -> ChatResult<Post>;

    async fn get_channel(&self, channel_id: &str) -> ChatResult<Channel>;

    async fn get_user(&self, user_id: &str) -> ChatResult<ChatUser>;

    /// Post `message` in the thread of `root_id`.
    async fn create_reply(
        &self,
        channel_id: &str,
        root_id: &str,
        message: &str,
    ) -> ChatResult<Post> {
        self.create_post(Post::reply(channel_id, root_id, message))
            .await
    }
}
