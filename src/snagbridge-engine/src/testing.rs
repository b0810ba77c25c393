//! In-memory collaborators for tests.
//!
//! [`FakeChat`] keeps posts in creation order and can be told to fail
//! creates in a channel or every update. [`FakeBackend`] serves canned
//! error details and records every call it receives.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use snagbridge_bugsnag::{
    BugsnagError, BugsnagResult, Collaborator, ErrorBackend, ErrorDetails, Organization, Project,
    StatusOperation,
};
use snagbridge_chat::{Channel, ChatError, ChatPlatform, ChatResult, ChatUser, Post};

fn not_found(what: &str, id: &str) -> ChatError {
    ChatError::Status {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

/// Chat platform backed by a vector of posts.
#[derive(Default)]
pub struct FakeChat {
    posts: Mutex<Vec<Post>>,
    users: Mutex<HashMap<String, ChatUser>>,
    channels: Mutex<HashSet<String>>,
    failing_channels: Mutex<HashSet<String>>,
    fail_updates: AtomicBool,
    next_id: AtomicU64,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel_id: &str) {
        self.channels.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn add_user(&self, user: ChatUser) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    /// Store `post` as-is (it must carry an id).
    pub fn insert_post(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }

    /// Make every create in `channel_id` fail.
    pub fn fail_create_in(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
    }

    /// Root posts, i.e. cards.
    pub fn card_count(&self) -> usize {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.root_id.is_empty())
            .count()
    }

    /// Messages of the replies in the thread of `root_id`, oldest first.
    pub fn replies_to(&self, root_id: &str) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.root_id == root_id)
            .map(|p| p.message.clone())
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn create_post(&self, mut post: Post) -> ChatResult<Post> {
        if self.failing_channels.lock().unwrap().contains(&post.channel_id) {
            return Err(ChatError::Status {
                status: 403,
                message: format!("cannot post in {}", post.channel_id),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        post.id = format!("post{n}");
        self.posts.lock().unwrap().push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, post: Post) -> ChatResult<Post> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ChatError::Network("connection reset".to_string()));
        }
        let mut posts = self.posts.lock().unwrap();
        let slot = posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or_else(|| not_found("post", &post.id))?;
        *slot = post.clone();
        Ok(post)
    }

    async fn get_post(&self, post_id: &str) -> ChatResult<Post> {
        self.post(post_id).ok_or_else(|| not_found("post", post_id))
    }

    async fn get_channel(&self, channel_id: &str) -> ChatResult<Channel> {
        if !self.channels.lock().unwrap().contains(channel_id) {
            return Err(not_found("channel", channel_id));
        }
        Ok(Channel {
            id: channel_id.to_string(),
            ..Default::default()
        })
    }

    async fn get_user(&self, user_id: &str) -> ChatResult<ChatUser> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("user", user_id))
    }
}

/// Error backend serving canned details.
#[derive(Default)]
pub struct FakeBackend {
    details: Mutex<HashMap<(String, String), ErrorDetails>>,
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_details(&self, project_id: &str, error_id: &str, details: ErrorDetails) {
        self.details
            .lock()
            .unwrap()
            .insert((project_id.to_string(), error_id.to_string()), details);
    }

    /// Make every call fail with a 502.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Calls received so far, e.g. `"update_status p1/e1 fix"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: String) -> BugsnagResult<()> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BugsnagError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ErrorBackend for FakeBackend {
    async fn list_organizations(&self) -> BugsnagResult<Vec<Organization>> {
        self.enter("list_organizations".to_string()).await?;
        Ok(Vec::new())
    }

    async fn list_projects(&self, organization_id: &str) -> BugsnagResult<Vec<Project>> {
        self.enter(format!("list_projects {organization_id}")).await?;
        Ok(Vec::new())
    }

    async fn list_collaborators(&self, organization_id: &str) -> BugsnagResult<Vec<Collaborator>> {
        self.enter(format!("list_collaborators {organization_id}"))
            .await?;
        Ok(Vec::new())
    }

    async fn get_error(&self, project_id: &str, error_id: &str) -> BugsnagResult<ErrorDetails> {
        self.enter(format!("get_error {project_id}/{error_id}"))
            .await?;
        self.details
            .lock()
            .unwrap()
            .get(&(project_id.to_string(), error_id.to_string()))
            .cloned()
            .ok_or_else(|| BugsnagError::Status {
                status: 404,
                body: "error not found".to_string(),
            })
    }

    async fn update_status(
        &self,
        project_id: &str,
        error_id: &str,
        operation: StatusOperation,
    ) -> BugsnagResult<()> {
        self.enter(format!("update_status {project_id}/{error_id} {operation}"))
            .await?;
        if let Some(details) = self
            .details
            .lock()
            .unwrap()
            .get_mut(&(project_id.to_string(), error_id.to_string()))
        {
            details.status = operation.resulting_status().to_string();
        }
        Ok(())
    }

    async fn assign_error(
        &self,
        project_id: &str,
        error_id: &str,
        collaborator: &str,
    ) -> BugsnagResult<()> {
        self.enter(format!("assign_error {project_id}/{error_id} {collaborator}"))
            .await
    }
}
