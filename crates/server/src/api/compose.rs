//! Compose trigger: re-run a bundle's composition gate.
//!
//! Callers prove themselves with either the webhook secret (`?secret=`) or
//! the user API credentials. Anonymous access is never enough, and the
//! webhook dev-mode bypass does not apply here.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use reelforge_core::{AuthRequest, GateOutcome, Stage};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{info, warn};

use super::bundles::engine_error;
use super::handlers::{api_error, ApiError};
use super::middleware::lowercase_headers;
use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ComposeParams {
    /// Release a held composition claim before re-running the gate.
    #[serde(default)]
    pub force: bool,
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ComposeResponse {
    pub bundle_id: String,
    /// "waiting", "skipped" or "advanced".
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

pub async fn compose_bundle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ComposeParams>,
    headers: HeaderMap,
) -> Result<Json<ComposeResponse>, ApiError> {
    authorize(&state, &headers, params.secret.as_deref()).await?;

    if params.force {
        warn!("Forced compose requested for bundle {}", id);
    }

    let outcome = state
        .engine()
        .compose(&id, params.force)
        .await
        .map_err(engine_error)?;
    info!("Compose trigger for bundle {}: {}", id, outcome.as_str());

    let stage = match &outcome {
        GateOutcome::Advanced(bundle) => Some(bundle.stage),
        _ => None,
    };

    Ok(Json(ComposeResponse {
        bundle_id: id,
        outcome: outcome.as_str(),
        stage,
    }))
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    secret: Option<&str>,
) -> Result<(), ApiError> {
    if state.verifier().verify_configured(secret).is_ok() {
        return Ok(());
    }

    let authenticator = state.authenticator();
    if authenticator.method_name() != "none" {
        let request = AuthRequest {
            headers: lowercase_headers(headers),
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        if authenticator.authenticate(&request).await.is_ok() {
            return Ok(());
        }
    }

    AUTH_FAILURES_TOTAL
        .with_label_values(&["compose_trigger"])
        .inc();
    Err(api_error(
        StatusCode::UNAUTHORIZED,
        "Compose trigger requires the webhook secret or an API key",
    ))
}
