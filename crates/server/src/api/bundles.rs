//! Bundle API handlers: generation requests, status polling and listings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use reelforge_core::bundle::OutputDescriptor;
use reelforge_core::ledger::{JobKind, JobStatus};
use reelforge_core::{
    Bundle, BundleError, BundleFilter, EngineError, Job, JobClass, LedgerError, Stage,
    SubmitRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::handlers::{api_error, ApiError};
use super::middleware::OwnerId;
use crate::state::AppState;

/// Maximum allowed limit for bundle queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for bundle queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for a new generation request
#[derive(Debug, Deserialize)]
pub struct CreateBundleBody {
    /// Web address of the site to turn into videos
    pub source_url: String,
    pub style: String,
    pub mood: String,
    /// Target video length in seconds
    pub duration_secs: u32,
}

/// Query parameters for listing bundles
#[derive(Debug, Deserialize)]
pub struct ListBundlesParams {
    pub stage: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Status view of a bundle.
///
/// Failure details stay server-side; clients only see the message.
#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub id: String,
    pub owner_id: String,
    pub source_url: String,
    pub stage: Stage,
    pub progress_pct: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<Bundle> for BundleResponse {
    fn from(bundle: Bundle) -> Self {
        let error = bundle.error_message().map(str::to_string);
        Self {
            id: bundle.id,
            owner_id: bundle.owner_id,
            source_url: bundle.source_url,
            stage: bundle.stage,
            progress_pct: bundle.stage.progress_pct(),
            output: bundle.output,
            error,
            created_at: bundle.created_at.to_rfc3339(),
            updated_at: bundle.updated_at.to_rfc3339(),
            completed_at: bundle.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for listing bundles
#[derive(Debug, Serialize)]
pub struct ListBundlesResponse {
    pub bundles: Vec<BundleResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// One sub-job as clients see it. Error text from the external services
/// stays in the ledger.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            status: job.status,
            output_url: job.output_url,
            thumbnail_url: job.thumbnail_url,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Ledger view of a bundle's sub-jobs
#[derive(Debug, Serialize)]
pub struct BundleJobsResponse {
    pub bundle_id: String,
    pub assets: Vec<JobResponse>,
    pub renders: Vec<JobResponse>,
}

/// Map engine errors at the request boundary to HTTP responses.
pub(crate) fn engine_error(e: EngineError) -> ApiError {
    match e {
        EngineError::InvalidInput(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        EngineError::QuotaExceeded { limit, .. } => api_error(
            StatusCode::TOO_MANY_REQUESTS,
            format!("Bundle quota exceeded (limit {})", limit),
        ),
        EngineError::Analysis(source) => {
            warn!("Site analysis failed: {}", source);
            api_error(StatusCode::BAD_GATEWAY, "Site analysis failed")
        }
        EngineError::NotFound(id) => {
            api_error(StatusCode::NOT_FOUND, format!("Bundle not found: {}", id))
        }
        other => {
            error!("Bundle request failed: {}", other);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn store_error(e: BundleError) -> ApiError {
    error!("Bundle store error: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

fn ledger_error(e: LedgerError) -> ApiError {
    error!("Job ledger error: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a generation request.
///
/// Returns as soon as the bundle exists; asset dispatch continues in the
/// background.
pub async fn create_bundle(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Json(body): Json<CreateBundleBody>,
) -> Result<(StatusCode, Json<BundleResponse>), ApiError> {
    let request = SubmitRequest {
        owner_id,
        source_url: body.source_url,
        style: body.style,
        mood: body.mood,
        duration_secs: body.duration_secs,
    };

    let bundle = state.engine().submit(request).await.map_err(engine_error)?;
    info!("Accepted bundle {} for {}", bundle.id, bundle.owner_id);

    let engine = Arc::clone(state.engine());
    let bundle_id = bundle.id.clone();
    tokio::spawn(async move {
        // Errors are logged and recorded on the bundle by the engine
        let _ = engine.dispatch_assets_or_fail(&bundle_id).await;
    });

    Ok((StatusCode::ACCEPTED, Json(BundleResponse::from(bundle))))
}

/// Poll a bundle's stage and outcome
pub async fn get_bundle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BundleResponse>, impl IntoResponse> {
    match state.bundles().get(&id) {
        Ok(Some(bundle)) => Ok(Json(BundleResponse::from(bundle))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Bundle not found: {}", id),
        )),
        Err(e) => Err(store_error(e)),
    }
}

/// List bundles with optional filters
pub async fn list_bundles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBundlesParams>,
) -> Result<Json<ListBundlesResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = BundleFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref stage) = params.stage {
        let stage: Stage = stage
            .parse()
            .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
        filter = filter.with_stage(stage);
    }

    if let Some(ref owner_id) = params.owner_id {
        filter = filter.with_owner(owner_id);
    }

    let bundles = state.bundles().list(&filter).map_err(store_error)?;
    let total = state.bundles().count(&filter).map_err(store_error)?;

    Ok(Json(ListBundlesResponse {
        bundles: bundles.into_iter().map(BundleResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Ledger entries for a bundle
pub async fn list_bundle_jobs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BundleJobsResponse>, impl IntoResponse> {
    match state.bundles().get(&id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Bundle not found: {}", id),
            ))
        }
        Err(e) => return Err(store_error(e)),
    }

    let ledger = state.ledger();
    let jobs = ledger
        .list_by_bundle(&id, JobClass::Asset)
        .and_then(|assets| Ok((assets, ledger.list_by_bundle(&id, JobClass::Render)?)));

    match jobs {
        Ok((assets, renders)) => Ok(Json(BundleJobsResponse {
            bundle_id: id,
            assets: assets.into_iter().map(JobResponse::from).collect(),
            renders: renders.into_iter().map(JobResponse::from).collect(),
        })),
        Err(e) => Err(ledger_error(e)),
    }
}
