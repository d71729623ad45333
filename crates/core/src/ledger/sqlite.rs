//! SQLite-backed job ledger.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{Job, JobClass, JobKind, JobLedger, JobOutput, JobStatus, LedgerError, UpdateOutcome};

const JOB_COLUMNS: &str = "id, bundle_id, job_class, kind, handle, status, output_url, thumbnail_url, error, created_at, updated_at, completed_at";

/// SQLite-backed job ledger.
pub struct SqliteJobLedger {
    conn: Mutex<Connection>,
}

impl SqliteJobLedger {
    /// Open (or create) the ledger tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory ledger for tests.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                bundle_id TEXT NOT NULL,
                job_class TEXT NOT NULL,
                kind TEXT NOT NULL,
                handle TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                output_url TEXT,
                thumbnail_url TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                UNIQUE (bundle_id, job_class, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_bundle ON jobs(bundle_id, job_class);
            CREATE INDEX IF NOT EXISTS idx_jobs_stale ON jobs(job_class, status, updated_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger connection poisoned".to_string()))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let class_str: String = row.get(2)?;
        let kind_str: String = row.get(3)?;
        let status_str: String = row.get(5)?;

        let class = match class_str.as_str() {
            "asset" => JobClass::Asset,
            "render" => JobClass::Render,
            other => return Err(conversion_error(2, format!("unknown job class: {}", other))),
        };
        let kind = JobKind::parse(class, &kind_str).map_err(|e| conversion_error(3, e))?;
        let status: JobStatus = status_str.parse().map_err(|e| conversion_error(5, e))?;

        Ok(Job {
            id: row.get(0)?,
            bundle_id: row.get(1)?,
            kind,
            handle: row.get(4)?,
            status,
            output_url: row.get(6)?,
            thumbnail_url: row.get(7)?,
            error: row.get(8)?,
            created_at: parse_timestamp(9, row.get(9)?)?,
            updated_at: parse_timestamp(10, row.get(10)?)?,
            completed_at: row
                .get::<_, Option<String>>(11)?
                .map(|s| parse_timestamp(11, s))
                .transpose()?,
        })
    }

    fn fetch(conn: &Connection, job_id: &str) -> Result<Option<Job>, LedgerError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![job_id], Self::row_to_job)
            .optional()?)
    }
}

/// Timestamps are stored with fixed precision so that string ordering matches time ordering.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

pub(crate) fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

impl JobLedger for SqliteJobLedger {
    fn record_job(&self, bundle_id: &str, kind: JobKind, handle: &str) -> Result<Job, LedgerError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let status = JobStatus::Processing;

        let result = conn.execute(
            "INSERT INTO jobs (id, bundle_id, job_class, kind, handle, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                bundle_id,
                kind.class().as_str(),
                kind.as_str(),
                handle,
                status.as_str(),
                format_timestamp(now),
                format_timestamp(now),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(LedgerError::Duplicate(format!(
                    "bundle {} already has a {} job (or handle {} is taken)",
                    bundle_id, kind, handle
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Job {
            id,
            bundle_id: bundle_id.to_string(),
            kind,
            handle: handle.to_string(),
            status,
            output_url: None,
            thumbnail_url: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get(&self, job_id: &str) -> Result<Option<Job>, LedgerError> {
        let conn = self.conn()?;
        Self::fetch(&conn, job_id)
    }

    fn get_by_handle(&self, handle: &str) -> Result<Option<Job>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM jobs WHERE handle = ?", JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![handle], Self::row_to_job)
            .optional()?)
    }

    fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        output: Option<JobOutput>,
        error: Option<String>,
    ) -> Result<UpdateOutcome, LedgerError> {
        let conn = self.conn()?;

        let predecessors = status.predecessors();
        if !predecessors.is_empty() {
            let allowed = predecessors
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect::<Vec<_>>()
                .join(", ");

            let now = Utc::now();
            let completed_at = status.is_terminal().then(|| format_timestamp(now));
            let (output_url, thumbnail_url) = match output {
                Some(out) => (Some(out.url), out.thumbnail_url),
                None => (None, None),
            };

            // Guarded write: only applies while the job is still in a predecessor status.
            let sql = format!(
                "UPDATE jobs SET status = ?, output_url = COALESCE(?, output_url), thumbnail_url = COALESCE(?, thumbnail_url), error = COALESCE(?, error), updated_at = ?, completed_at = COALESCE(?, completed_at) WHERE id = ? AND status IN ({})",
                allowed
            );
            let changed = conn.execute(
                &sql,
                params![
                    status.as_str(),
                    output_url,
                    thumbnail_url,
                    error,
                    format_timestamp(now),
                    completed_at,
                    job_id,
                ],
            )?;

            if changed == 1 {
                let job = Self::fetch(&conn, job_id)?
                    .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))?;
                return Ok(UpdateOutcome::Applied(job));
            }
        }

        match Self::fetch(&conn, job_id)? {
            Some(job) => Ok(UpdateOutcome::Ignored(job)),
            None => Err(LedgerError::NotFound(job_id.to_string())),
        }
    }

    fn list_by_bundle(&self, bundle_id: &str, class: JobClass) -> Result<Vec<Job>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM jobs WHERE bundle_id = ? AND job_class = ? ORDER BY created_at ASC, kind ASC",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![bundle_id, class.as_str()], Self::row_to_job)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    fn list_stale(
        &self,
        class: JobClass,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM jobs WHERE job_class = ? AND status IN ('pending', 'processing') AND updated_at < ? ORDER BY updated_at ASC LIMIT ?",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![class.as_str(), format_timestamp(older_than), limit],
            Self::row_to_job,
        )?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }
}
