//! Job ledger trait and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Job, JobClass, JobKind, JobOutput, JobStatus, UpdateOutcome};

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Job not found (by id).
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A job for this (bundle, kind) or with this handle already exists.
    #[error("Job already recorded: {0}")]
    Duplicate(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

/// Persistent record of every asset and render job.
///
/// Lookups by external handle serve the webhook path; lookups by bundle serve
/// fan-in aggregation. `update_status` enforces the terminal-state rule: the
/// first terminal write wins and later writes are ignored, which is what
/// makes duplicate webhook deliveries safe.
pub trait JobLedger: Send + Sync {
    /// Record a dispatched job. The job starts in `Processing`.
    fn record_job(&self, bundle_id: &str, kind: JobKind, handle: &str) -> Result<Job, LedgerError>;

    /// Get a job by its ledger id.
    fn get(&self, job_id: &str) -> Result<Option<Job>, LedgerError>;

    /// Get a job by external handle. A miss is a normal outcome.
    fn get_by_handle(&self, handle: &str) -> Result<Option<Job>, LedgerError>;

    /// Move a job forward. Writes to terminal jobs are ignored, not errors.
    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        output: Option<JobOutput>,
        error: Option<String>,
    ) -> Result<UpdateOutcome, LedgerError>;

    /// All jobs of one class belonging to a bundle, oldest first.
    fn list_by_bundle(&self, bundle_id: &str, class: JobClass) -> Result<Vec<Job>, LedgerError>;

    /// Non-terminal jobs of a class not updated since `older_than`.
    fn list_stale(
        &self,
        class: JobClass,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, LedgerError>;
}
