//! Bundle storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{AssetSlots, Bundle, BundleFailure, GenerationParams, OutputDescriptor, Script, SiteAnalysis, Stage};

/// Error type for bundle operations.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle not found.
    #[error("Bundle not found: {0}")]
    NotFound(String),

    /// The requested move is not a forward transition.
    #[error("Cannot move bundle {bundle_id} from {from} to {to}")]
    InvalidTransition {
        bundle_id: String,
        from: Stage,
        to: Stage,
    },

    /// The bundle was not in the expected stage (someone else moved it).
    #[error("Bundle {bundle_id} is in stage {actual}, expected {expected}")]
    StageConflict {
        bundle_id: String,
        expected: Stage,
        actual: Stage,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for BundleError {
    fn from(e: rusqlite::Error) -> Self {
        BundleError::Database(e.to_string())
    }
}

/// Request to create a new bundle.
#[derive(Debug, Clone)]
pub struct CreateBundleRequest {
    /// Owner of the bundle.
    pub owner_id: String,
    /// Source web address.
    pub source_url: String,
    /// Requested style/mood/duration.
    pub params: GenerationParams,
    /// Site analysis, if already available.
    pub analysis: Option<SiteAnalysis>,
}

/// Filter for querying bundles.
#[derive(Debug, Clone)]
pub struct BundleFilter {
    /// Filter by stage.
    pub stage: Option<Stage>,
    /// Filter by owner.
    pub owner_id: Option<String>,
    /// Only bundles not updated since this instant.
    pub updated_before: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for BundleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleFilter {
    pub fn new() -> Self {
        Self {
            stage: None,
            owner_id: None,
            updated_before: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for bundle storage backends.
///
/// Every stage write is conditional on the current stage so that concurrent
/// webhook deliveries cannot regress or double-advance a bundle.
pub trait BundleStore: Send + Sync {
    /// Create a new bundle in `Pending`.
    fn create(&self, request: CreateBundleRequest) -> Result<Bundle, BundleError>;

    /// Get a bundle by ID.
    fn get(&self, id: &str) -> Result<Option<Bundle>, BundleError>;

    /// List bundles matching the filter, newest first.
    fn list(&self, filter: &BundleFilter) -> Result<Vec<Bundle>, BundleError>;

    /// Count bundles matching the filter (ignores limit/offset).
    fn count(&self, filter: &BundleFilter) -> Result<i64, BundleError>;

    /// Move `from -> to` if and only if the bundle is still in `from`.
    /// Not usable for `Failed` (see [`BundleStore::fail`]).
    fn advance_stage(&self, id: &str, from: Stage, to: Stage) -> Result<Bundle, BundleError>;

    /// Move any non-terminal bundle to `Failed`.
    /// Returns `None` if the bundle was already terminal.
    fn fail(&self, id: &str, failure: BundleFailure) -> Result<Option<Bundle>, BundleError>;

    /// Move `from -> Completed`, attaching the output descriptor.
    fn complete(
        &self,
        id: &str,
        from: Stage,
        output: &OutputDescriptor,
    ) -> Result<Bundle, BundleError>;

    /// Store the generated script.
    fn set_script(&self, id: &str, script: &Script) -> Result<(), BundleError>;

    /// Store the asset output references.
    fn set_assets(&self, id: &str, assets: &AssetSlots) -> Result<(), BundleError>;

    /// Claim the one-time gate for `stage`. Exactly one caller gets `true`
    /// while the bundle sits in that stage.
    fn claim_gate(&self, id: &str, stage: Stage) -> Result<bool, BundleError>;

    /// Release a held gate claim so the gate can be re-run (operator retry).
    fn release_gate(&self, id: &str, stage: Stage) -> Result<bool, BundleError>;

    /// Atomically check the owner's usage against `limit` and count one more
    /// bundle. `limit == 0` means unlimited. Returns `false` when over quota.
    fn reserve_quota(&self, owner_id: &str, limit: u32) -> Result<bool, BundleError>;

    /// Give back a reservation made by [`BundleStore::reserve_quota`].
    fn release_quota(&self, owner_id: &str) -> Result<(), BundleError>;
}
