//! REST client for the Bugsnag Data Access API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::backend::ErrorBackend;
use crate::error::{BugsnagError, BugsnagResult};
use crate::types::{Collaborator, ErrorDetails, Organization, Project, StatusOperation};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.bugsnag.com";

/// Options for [`BugsnagClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root; overridden in tests and for on-premise installs.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Authenticated client; cheap to clone.
#[derive(Clone)]
pub struct BugsnagClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl std::fmt::Debug for BugsnagClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugsnagClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl BugsnagClient {
    pub fn new(token: SecretString) -> BugsnagResult<Self> {
        Self::with_options(token, ClientOptions::default())
    }

    pub fn with_options(token: SecretString, options: ClientOptions) -> BugsnagResult<Self> {
        if token.expose_secret().trim().is_empty() {
            return Err(BugsnagError::Config("API token is required".to_string()));
        }

        let base_url = Url::parse(options.base_url.trim())
            .map_err(|e| BugsnagError::Config(format!("Invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BugsnagError::Config(format!(
                "Invalid base URL: {}",
                options.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| BugsnagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> BugsnagResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BugsnagError::Config("Base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> BugsnagResult<reqwest::Response> {
        debug!(%method, path = url.path(), "Bugsnag API request");

        let mut request = self
            .http
            .request(method, url)
            .header(
                "Authorization",
                format!("token {}", self.token.expose_secret()),
            )
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BugsnagError::Status { status, body });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> BugsnagResult<T> {
        let url = self.endpoint(segments)?;
        let response = self.send(Method::GET, url, None).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn patch_error(
        &self,
        project_id: &str,
        error_id: &str,
        body: serde_json::Value,
    ) -> BugsnagResult<()> {
        require("project id", project_id)?;
        require("error id", error_id)?;
        let url = self.endpoint(&["projects", project_id, "errors", error_id])?;
        self.send(Method::PATCH, url, Some(body)).await?;
        Ok(())
    }
}

fn require(what: &str, value: &str) -> BugsnagResult<()> {
    if value.trim().is_empty() {
        return Err(BugsnagError::InvalidArgument(format!("{} is required", what)));
    }
    Ok(())
}

#[async_trait]
impl ErrorBackend for BugsnagClient {
    async fn list_organizations(&self) -> BugsnagResult<Vec<Organization>> {
        self.get_json(&["user", "organizations"]).await
    }

    async fn list_projects(&self, organization_id: &str) -> BugsnagResult<Vec<Project>> {
        require("organization id", organization_id)?;
        self.get_json(&["organizations", organization_id, "projects"])
            .await
    }

    async fn list_collaborators(&self, organization_id: &str) -> BugsnagResult<Vec<Collaborator>> {
        require("organization id", organization_id)?;
        self.get_json(&["organizations", organization_id, "collaborators"])
            .await
    }

    async fn get_error(&self, project_id: &str, error_id: &str) -> BugsnagResult<ErrorDetails> {
        require("project id", project_id)?;
        require("error id", error_id)?;
        self.get_json(&["projects", project_id, "errors", error_id])
            .await
    }

    async fn update_status(
        &self,
        project_id: &str,
        error_id: &str,
        operation: StatusOperation,
    ) -> BugsnagResult<()> {
        self.patch_error(project_id, error_id, json!({ "operation": operation }))
            .await
    }

    async fn assign_error(
        &self,
        project_id: &str,
        error_id: &str,
        collaborator: &str,
    ) -> BugsnagResult<()> {
        require("collaborator", collaborator)?;
        self.patch_error(
            project_id,
            error_id,
            json!({ "assigned_collaborator_id": collaborator }),
        )
        .await
    }
}
