//! Admin API: routing rules, user mappings and read-through listings.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snagbridge_bugsnag::{Collaborator, ErrorBackend, Organization, Project};
use snagbridge_store::{RoutingRule, UserMapping};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Stored list as returned by the GET endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingsEnvelope<T> {
    pub mappings: Vec<T>,
}

/// Saved list echoed back by the PUT endpoints.
#[derive(Debug, Serialize)]
pub struct SavedMappings<T> {
    pub status: &'static str,
    pub mappings: Vec<T>,
}

/// Accepts either `{"mappings": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum MappingsBody<T> {
    Envelope(MappingsEnvelope<T>),
    List(Vec<T>),
}

fn decode_list<T: DeserializeOwned>(body: &[u8]) -> AppResult<Vec<T>> {
    let body: MappingsBody<T> = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("invalid request body: {e}")))?;
    Ok(match body {
        MappingsBody::Envelope(envelope) => envelope.mappings,
        MappingsBody::List(list) => list,
    })
}

fn trim_all(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_rules(rules: Vec<RoutingRule>) -> AppResult<Vec<RoutingRule>> {
    rules
        .into_iter()
        .enumerate()
        .map(|(i, rule)| {
            let project_id = rule.project_id.trim().to_string();
            let channel_id = rule.channel_id.trim().to_string();
            if project_id.is_empty() || channel_id.is_empty() {
                return Err(AppError::Validation(format!(
                    "rule {i}: project_id and channel_id are required"
                )));
            }
            Ok(RoutingRule {
                project_id,
                channel_id,
                environments: trim_all(rule.environments),
                severities: trim_all(rule.severities),
                events: trim_all(rule.events),
            })
        })
        .collect()
}

fn normalize_mappings(mappings: Vec<UserMapping>) -> AppResult<Vec<UserMapping>> {
    mappings
        .into_iter()
        .enumerate()
        .map(|(i, mapping)| {
            let mm_user_id = mapping.mm_user_id.trim().to_string();
            if mm_user_id.is_empty() {
                return Err(AppError::Validation(format!(
                    "mapping {i}: mm_user_id is required"
                )));
            }
            let normalized = UserMapping {
                mm_user_id,
                bugsnag_user_id: non_blank(mapping.bugsnag_user_id),
                bugsnag_email: non_blank(mapping.bugsnag_email),
            };
            if normalized.bugsnag_user_id.is_none() && normalized.bugsnag_email.is_none() {
                return Err(AppError::Validation(format!(
                    "mapping {i}: bugsnag_user_id or bugsnag_email is required"
                )));
            }
            Ok(normalized)
        })
        .collect()
}

pub async fn get_channel_rules(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<MappingsEnvelope<RoutingRule>>> {
    let mappings = state.store.routing_rules().await?;
    Ok(Json(MappingsEnvelope { mappings }))
}

pub async fn save_channel_rules(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<SavedMappings<RoutingRule>>> {
    let rules = normalize_rules(decode_list(&body)?)?;
    state.store.save_routing_rules(&rules).await?;
    info!(count = rules.len(), "Routing rules saved");
    Ok(Json(SavedMappings {
        status: "ok",
        mappings: rules,
    }))
}

pub async fn get_user_mappings(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<MappingsEnvelope<UserMapping>>> {
    let mappings = state.store.user_mappings().await?;
    Ok(Json(MappingsEnvelope { mappings }))
}

pub async fn save_user_mappings(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<SavedMappings<UserMapping>>> {
    let mappings = normalize_mappings(decode_list(&body)?)?;
    state.store.save_user_mappings(&mappings).await?;
    info!(count = mappings.len(), "User mappings saved");
    Ok(Json(SavedMappings {
        status: "ok",
        mappings,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationQuery {
    #[serde(default)]
    pub organization_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationsResponse {
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub organization_id: String,
    pub projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
pub struct CollaboratorsResponse {
    pub organization_id: String,
    pub collaborators: Vec<Collaborator>,
}

fn require_backend(state: &AppState) -> AppResult<&Arc<dyn ErrorBackend>> {
    state
        .backend()
        .ok_or_else(|| AppError::Unavailable("Bugsnag API token is not configured".to_string()))
}

/// Requested organization, else the configured one, else the first one
/// the token can see.
async fn resolve_organization(
    state: &AppState,
    backend: &Arc<dyn ErrorBackend>,
    requested: Option<String>,
) -> AppResult<String> {
    if let Some(id) = non_blank(requested) {
        return Ok(id);
    }
    if let Some(id) = state.organization_id() {
        return Ok(id.to_string());
    }
    backend
        .list_organizations()
        .await?
        .into_iter()
        .next()
        .map(|org| org.id)
        .ok_or_else(|| AppError::BadGateway("no organizations visible to the API token".into()))
}

pub async fn list_organizations(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<OrganizationsResponse>> {
    let backend = require_backend(&state)?;
    let organizations = backend.list_organizations().await?;
    Ok(Json(OrganizationsResponse { organizations }))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrganizationQuery>,
) -> AppResult<Json<ProjectsResponse>> {
    let backend = require_backend(&state)?;
    let organization_id = resolve_organization(&state, backend, query.organization_id).await?;
    let projects = backend.list_projects(&organization_id).await?;
    Ok(Json(ProjectsResponse {
        organization_id,
        projects,
    }))
}

pub async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrganizationQuery>,
) -> AppResult<Json<CollaboratorsResponse>> {
    let backend = require_backend(&state)?;
    let organization_id = resolve_organization(&state, backend, query.organization_id).await?;
    let collaborators = backend.list_collaborators(&organization_id).await?;
    Ok(Json(CollaboratorsResponse {
        organization_id,
        collaborators,
    }))
}
