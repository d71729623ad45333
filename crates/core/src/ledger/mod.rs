//! Job ledger: the durable record of every asset and render sub-job.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteJobLedger;
pub use store::{JobLedger, LedgerError};
pub use types::{
    AssetKind, Job, JobClass, JobKind, JobOutput, JobStatus, RenderFormat, UpdateOutcome,
};

pub(crate) use sqlite::{conversion_error, format_timestamp, parse_timestamp};
