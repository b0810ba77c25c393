//! Interactive button callbacks.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use snagbridge_engine::{ActionOutcome, ActionRequest};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub text: String,
    /// False when the press was handled but no card was refreshed.
    pub card_updated: bool,
}

/// Only a JSON object is a press; serde would otherwise accept `[]` as an
/// all-default request.
fn decode_request(body: &[u8]) -> AppResult<ActionRequest> {
    let invalid = |reason: String| {
        AppError::BadRequest(format!("invalid interactive action payload: {reason}"))
    };
    let value: Value = serde_json::from_slice(body).map_err(|e| invalid(e.to_string()))?;
    if !value.is_object() {
        return Err(invalid("expected a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}

pub async fn handle_action(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Response> {
    let request = decode_request(&body)?;

    let response = match state.actions.handle(&request).await? {
        ActionOutcome::Navigate { url } => (
            StatusCode::OK,
            Json(json!({ "type": "ok", "open_in_browser": url })),
        )
            .into_response(),
        ActionOutcome::Note { text, card_updated } => (
            StatusCode::ACCEPTED,
            Json(ActionResponse { text, card_updated }),
        )
            .into_response(),
    };
    Ok(response)
}
