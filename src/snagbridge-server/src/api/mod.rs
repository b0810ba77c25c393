//! HTTP routes and handlers.
//!
//! Two integration endpoints sit at the root (`/webhook` for the error
//! tracker, `/actions` for button presses); everything else lives under
//! `/api/v1`.

mod actions;
mod admin;
mod health;
mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub use actions::ActionResponse;
pub use admin::{MappingsEnvelope, SavedMappings};
pub use health::HealthResponse;
pub use webhook::{TOKEN_HEADER, WebhookResponse};

/// Integration endpoints called by external systems.
pub fn integration_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/actions", post(actions::handle_action))
}

/// Routes nested under `/api/v1`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/channel-rules",
            get(admin::get_channel_rules)
                .put(admin::save_channel_rules)
                .post(admin::save_channel_rules),
        )
        .route(
            "/user-mappings",
            get(admin::get_user_mappings)
                .put(admin::save_user_mappings)
                .post(admin::save_user_mappings),
        )
        .route("/organizations", get(admin::list_organizations))
        .route("/projects", get(admin::list_projects))
        .route("/collaborators", get(admin::list_collaborators))
}
