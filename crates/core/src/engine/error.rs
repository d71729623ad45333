use thiserror::Error;

use crate::bundle::BundleError;
use crate::ledger::LedgerError;
use crate::services::ServiceError;

/// Errors surfaced by the stage engine and finalizer.
///
/// Only request-boundary problems (`InvalidInput`, `QuotaExceeded`,
/// `Analysis`, `NotFound`) reach callers in normal operation. Failures after a
/// bundle exists are recorded on the bundle instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Quota exceeded for owner {owner_id} (limit {limit})")]
    QuotaExceeded { owner_id: String, limit: u32 },

    #[error("Site analysis failed: {0}")]
    Analysis(#[source] ServiceError),

    #[error("Bundle not found: {0}")]
    NotFound(String),

    #[error("Bundle store error: {0}")]
    Bundle(#[from] BundleError),

    #[error("Job ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
