//! Interfaces of the slow, unreliable collaborators the orchestrator drives.

use async_trait::async_trait;

use crate::bundle::{QualityReview, Script, SiteAnalysis};
use crate::ledger::AssetKind;

use super::{AssetRequest, RenderRequest, ReviewRequest, ScriptRequest, ServiceError};

/// Inspects the source site and extracts its content and colors.
#[async_trait]
pub trait SiteAnalyzer: Send + Sync {
    async fn analyze(&self, source_url: &str) -> Result<SiteAnalysis, ServiceError>;
}

/// Fire-and-forget AI asset generation. Completion arrives by webhook.
#[async_trait]
pub trait AssetGenerator: Send + Sync {
    /// Queue a generation and return the external handle.
    async fn dispatch(&self, request: &AssetRequest) -> Result<String, ServiceError>;
}

/// Resolves the output reference of a finished asset job.
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch_result(&self, kind: AssetKind, handle: &str) -> Result<String, ServiceError>;
}

/// Produces the scene script once the asset fan-in completes.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, request: &ScriptRequest) -> Result<Script, ServiceError>;
}

/// Cloud renderer. Completion arrives by webhook.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Queue one render and return the external handle.
    async fn dispatch(&self, request: &RenderRequest) -> Result<String, ServiceError>;
}

/// Optional automated quality review of the finished renditions.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<QualityReview, ServiceError>;
}
