//! Inbound callbacks from the asset generator and the renderer.
//!
//! Only transport problems (bad secret, bad payload) become non-2xx
//! responses. Everything else is acknowledged so senders never retry
//! business-logic failures.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reelforge_core::{WebhookError, WebhookOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use super::handlers::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssetWebhookParams {
    pub kind: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenderWebhookParams {
    pub format: Option<String>,
    pub secret: Option<String>,
}

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn asset_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AssetWebhookParams>,
    body: Bytes,
) -> Response {
    let result = state
        .gateway()
        .handle_asset(params.kind.as_deref(), params.secret.as_deref(), &body)
        .await;
    into_response(result)
}

pub async fn render_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RenderWebhookParams>,
    body: Bytes,
) -> Response {
    let result = state
        .gateway()
        .handle_render(params.format.as_deref(), params.secret.as_deref(), &body)
        .await;
    into_response(result)
}

fn into_response(result: Result<WebhookOutcome, WebhookError>) -> Response {
    match result {
        Ok(outcome) => {
            let error = match outcome {
                WebhookOutcome::NotFound => Some("Job not found".to_string()),
                _ => None,
            };
            Json(WebhookResponse {
                received: true,
                outcome: outcome.as_str(),
                error,
            })
            .into_response()
        }
        Err(WebhookError::Unauthorized) => {
            warn!("Rejected webhook with invalid secret");
            api_error(StatusCode::UNAUTHORIZED, "Invalid webhook secret").into_response()
        }
        Err(WebhookError::Malformed(msg)) => {
            api_error(StatusCode::BAD_REQUEST, msg).into_response()
        }
        Err(WebhookError::Internal(msg)) => {
            error!("Webhook processing failed: {}", msg);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
