//! The error-tracker seam.

use async_trait::async_trait;

use crate::error::BugsnagResult;
use crate::types::{Collaborator, ErrorDetails, Organization, Project, StatusOperation};

/// Operations the bridge needs from the error tracker.
///
/// [`crate::BugsnagClient`] is the production implementation; the engine
/// only depends on this trait.
#[async_trait]
pub trait ErrorBackend: Send + Sync {
    async fn list_organizations(&self) -> BugsnagResult<Vec<Organization>>;

    async fn list_projects(&self, organization_id: &str) -> BugsnagResult<Vec<Project>>;

    async fn list_collaborators(&self, organization_id: &str) -> BugsnagResult<Vec<Collaborator>>;

    /// Current details of one error.
    async fn get_error(&self, project_id: &str, error_id: &str) -> BugsnagResult<ErrorDetails>;

    /// Apply a workflow operation such as fix or ignore.
    async fn update_status(
        &self,
        project_id: &str,
        error_id: &str,
        operation: StatusOperation,
    ) -> BugsnagResult<()>;

    /// Assign the error to a collaborator (id or email).
    async fn assign_error(
        &self,
        project_id: &str,
        error_id: &str,
        collaborator: &str,
    ) -> BugsnagResult<()>;
}
