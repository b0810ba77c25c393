//! Inbound error-tracker webhooks.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use snagbridge_engine::ErrorEvent;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Header carrying the webhook token when it is not in the query string.
pub const TOKEN_HEADER: &str = "X-Bugsnag-Token";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub token: Option<String>,
    /// Extra destination that bypasses routing rules.
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub processed: usize,
}

pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<WebhookResponse>)> {
    let provided = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()));

    if let Err(e) = state.webhook_auth().await.verify(provided) {
        warn!("Webhook rejected: {}", e);
        return Err(e.into());
    }

    let event = ErrorEvent::from_json(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?;
    info!(
        project_id = %event.project_id,
        error_id = %event.error_id,
        trigger = %event.trigger.kind,
        "Webhook received"
    );

    let report = state
        .ingestor
        .ingest(&event, query.channel_id.as_deref())
        .await?;

    if report.failed > 0 {
        warn!(
            processed = report.processed,
            failed = report.failed,
            "Webhook partially delivered"
        );
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            status: "accepted",
            processed: report.processed,
        }),
    ))
}
