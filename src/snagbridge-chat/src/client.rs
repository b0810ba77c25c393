//! Mattermost REST API v4 client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{ChatError, ChatResult};
use crate::platform::ChatPlatform;
use crate::post::{Channel, ChatUser, Post};

/// Bot-token authenticated client.
#[derive(Clone)]
pub struct MattermostClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for MattermostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl MattermostClient {
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> ChatResult<Self> {
        if token.expose_secret().trim().is_empty() {
            return Err(ChatError::Config("bot token is required".to_string()));
        }
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ChatError::Config(format!("Invalid server URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::Config(format!("Invalid server URL: {}", base_url)));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ChatResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::Config("Server URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(&self, method: Method, segments: &[&str], body: Option<&B>) -> ChatResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%method, path = url.path(), "Mattermost API request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .map(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(ChatError::Status { status, message });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ChatPlatform for MattermostClient {
    async fn create_post(&self, post: Post) -> ChatResult<Post> {
        self.call(Method::POST, &["posts"], Some(&post)).await
    }

    async fn update_post(&self, post: Post) -> ChatResult<Post> {
        if post.id.is_empty() {
            return Err(ChatError::Config("cannot update a post without id".to_string()));
        }
        self.call(Method::PUT, &["posts", post.id.as_str()], Some(&post))
            .await
    }

    async fn get_post(&self, post_id: &str) -> ChatResult<Post> {
        self.call::<(), _>(Method::GET, &["posts", post_id], None)
            .await
    }

    async fn get_channel(&self, channel_id: &str) -> ChatResult<Channel> {
        self.call::<(), _>(Method::GET, &["channels", channel_id], None)
            .await
    }

    async fn get_user(&self, user_id: &str) -> ChatResult<ChatUser> {
        self.call::<(), _>(Method::GET, &["users", user_id], None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MattermostClient {
        MattermostClient::new(
            &server.uri(),
            SecretString::from("bot-token".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_post_with_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/posts"))
            .and(header("Authorization", "Bearer bot-token"))
            .and(body_partial_json(json!({
                "channel_id": "c1",
                "props": {"attachments": [{"title": "TypeError"}]}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "post1",
                "channel_id": "c1",
                "message": "card"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let post = Post::new("c1", "card")
            .with_attachments(vec![Attachment::new().with_title("TypeError", "")]);
        let created = client_for(&server).create_post(post).await.unwrap();
        assert_eq!(created.id, "post1");
    }

    #[tokio::test]
    async fn test_create_reply_sets_root() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/posts"))
            .and(body_partial_json(json!({"root_id": "post1", "message": "note"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "reply1",
                "channel_id": "c1",
                "root_id": "post1",
                "message": "note"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .create_reply("c1", "post1", "note")
            .await
            .unwrap();
        assert_eq!(reply.root_id, "post1");
    }

    #[tokio::test]
    async fn test_update_post_uses_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v4/posts/post1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "post1",
                "channel_id": "c1",
                "message": "updated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut post = Post::new("c1", "updated");
        post.id = "post1".to_string();
        let updated = client_for(&server).update_post(post).await.unwrap();
        assert_eq!(updated.message, "updated");
    }

    #[tokio::test]
    async fn test_update_without_id_is_rejected_locally() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .update_post(Post::new("c1", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[tokio::test]
    async fn test_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/channels/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "id": "app.channel.get.existing.app_error",
                "message": "Unable to find the existing channel.",
                "status_code": 404
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).get_channel("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Mattermost API returned status 404: Unable to find the existing channel."
        );
    }

    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/users/u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "username": "ada",
                "email": "ada@example.com",
                "roles": "system_user"
            })))
            .mount(&server)
            .await;

        let user = client_for(&server).get_user("u1").await.unwrap();
        assert_eq!(user.username, "ada");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn test_requires_token() {
        let err = MattermostClient::new(
            "http://localhost:8065",
            SecretString::from(String::new()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
