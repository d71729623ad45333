//! Request and error types shared by the external service interfaces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bundle::{AssetSlots, GenerationParams, RenderedVideo, Script, SiteAnalysis};
use crate::ledger::{AssetKind, RenderFormat};

/// Errors returned by external service calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The call did not finish within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The service could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status.
    #[error("Service rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The service answered but the payload could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One asset-generation dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRequest {
    pub bundle_id: String,
    pub kind: AssetKind,
    pub params: GenerationParams,
    pub analysis: SiteAnalysis,
    /// Where the generation service reports completion.
    pub callback_url: String,
}

/// Input to the script generator.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    pub bundle_id: String,
    pub params: GenerationParams,
    pub analysis: SiteAnalysis,
    /// Successfully generated assets; absent slots are `None`.
    pub assets: AssetSlots,
}

/// One per-format render dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    pub bundle_id: String,
    pub format: RenderFormat,
    pub width: u32,
    pub height: u32,
    pub params: GenerationParams,
    pub script: Script,
    pub assets: AssetSlots,
    pub analysis: SiteAnalysis,
    pub callback_url: String,
}

/// Input to the automated reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub bundle_id: String,
    pub params: GenerationParams,
    pub videos: BTreeMap<RenderFormat, RenderedVideo>,
}

/// Handle returned by dispatch endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DispatchResponse {
    #[serde(alias = "request_id", alias = "render_id")]
    pub id: String,
}

/// Output reference returned by the result endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub video: Option<MediaRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MediaRef {
    pub url: String,
}

impl ResultResponse {
    pub fn into_url(self) -> Option<String> {
        self.url
            .or(self.video.map(|v| v.url))
            .filter(|u| !u.is_empty())
    }
}
