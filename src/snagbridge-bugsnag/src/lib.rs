//! Bugsnag integration for snagbridge.
//!
//! A thin, authenticated client for the parts of the Bugsnag Data Access API
//! the bridge uses: reading organizations, projects, collaborators and error
//! details, changing an error's workflow status, and assigning it.
//!
//! # Example
//!
//! ```rust,ignore
//! use secrecy::SecretString;
//! use snagbridge_bugsnag::{BugsnagClient, ErrorBackend, StatusOperation};
//!
//! let client = BugsnagClient::new(SecretString::from(token))?;
//! let details = client.get_error("project", "error").await?;
//! client.update_status("project", "error", StatusOperation::Fix).await?;
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::ErrorBackend;
pub use client::{BugsnagClient, ClientOptions, DEFAULT_BASE_URL};
pub use error::{BugsnagError, BugsnagResult};
pub use types::{
    Collaborator, ErrorDetails, Organization, Project, StatusOperation, null_as_default,
};
