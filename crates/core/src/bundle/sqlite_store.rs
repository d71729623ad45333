//! SQLite-backed bundle store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

use crate::ledger::{conversion_error, format_timestamp, parse_timestamp};

use super::{
    AssetSlots, Bundle, BundleError, BundleFailure, BundleFilter, BundleStore,
    CreateBundleRequest, OutputDescriptor, Script, Stage,
};

const BUNDLE_COLUMNS: &str = "id, owner_id, source_url, params, stage, analysis, script, assets, output, failure, created_at, updated_at, completed_at";

/// SQLite-backed bundle store.
pub struct SqliteBundleStore {
    conn: Mutex<Connection>,
}

impl SqliteBundleStore {
    /// Create a new SQLite bundle store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, BundleError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite bundle store (useful for testing).
    pub fn in_memory() -> Result<Self, BundleError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), BundleError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bundles (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                params TEXT NOT NULL,
                stage TEXT NOT NULL,
                analysis TEXT,
                script TEXT,
                assets TEXT NOT NULL,
                output TEXT,
                failure TEXT,
                gate_claim TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_bundles_owner ON bundles(owner_id);
            CREATE INDEX IF NOT EXISTS idx_bundles_stage ON bundles(stage, updated_at);

            CREATE TABLE IF NOT EXISTS owner_usage (
                owner_id TEXT PRIMARY KEY,
                bundles_created INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BundleError> {
        self.conn
            .lock()
            .map_err(|_| BundleError::Database("bundle store connection poisoned".to_string()))
    }

    fn build_where_clause(filter: &BundleFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(stage) = filter.stage {
            conditions.push("stage = ?");
            params.push(Box::new(stage.as_str()));
        }

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push("owner_id = ?");
            params.push(Box::new(owner_id.clone()));
        }

        if let Some(cutoff) = filter.updated_before {
            conditions.push("updated_at < ?");
            params.push(Box::new(format_timestamp(cutoff)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_bundle(row: &rusqlite::Row) -> rusqlite::Result<Bundle> {
        let stage_str: String = row.get(4)?;
        let stage: Stage = stage_str.parse().map_err(|e| conversion_error(4, e))?;

        Ok(Bundle {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            source_url: row.get(2)?,
            params: json_column(3, row.get(3)?)?,
            stage,
            analysis: optional_json_column(5, row.get(5)?)?,
            script: optional_json_column(6, row.get(6)?)?,
            assets: json_column(7, row.get(7)?)?,
            output: optional_json_column(8, row.get(8)?)?,
            failure: optional_json_column(9, row.get(9)?)?,
            created_at: parse_timestamp(10, row.get(10)?)?,
            updated_at: parse_timestamp(11, row.get(11)?)?,
            completed_at: row
                .get::<_, Option<String>>(12)?
                .map(|s| parse_timestamp(12, s))
                .transpose()?,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Bundle>, BundleError> {
        let sql = format!("SELECT {} FROM bundles WHERE id = ?", BUNDLE_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_bundle)
            .optional()?)
    }

    /// Turn a zero-row conditional update into the right error.
    fn conflict(conn: &Connection, id: &str, expected: Stage) -> BundleError {
        match Self::fetch(conn, id) {
            Ok(Some(bundle)) => BundleError::StageConflict {
                bundle_id: id.to_string(),
                expected,
                actual: bundle.stage,
            },
            Ok(None) => BundleError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, BundleError> {
    serde_json::to_string(value).map_err(|e| BundleError::Database(e.to_string()))
}

fn json_column<T: DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn optional_json_column<T: DeserializeOwned>(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<T>> {
    raw.map(|s| json_column(idx, s)).transpose()
}

impl BundleStore for SqliteBundleStore {
    fn create(&self, request: CreateBundleRequest) -> Result<Bundle, BundleError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let stage = Stage::Pending;
        let assets = AssetSlots::default();

        let analysis_json = request.analysis.as_ref().map(to_json).transpose()?;

        conn.execute(
            "INSERT INTO bundles (id, owner_id, source_url, params, stage, analysis, assets, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.owner_id,
                request.source_url,
                to_json(&request.params)?,
                stage.as_str(),
                analysis_json,
                to_json(&assets)?,
                format_timestamp(now),
                format_timestamp(now),
            ],
        )?;

        Ok(Bundle {
            id,
            owner_id: request.owner_id,
            source_url: request.source_url,
            params: request.params,
            stage,
            analysis: request.analysis,
            script: None,
            assets,
            output: None,
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Bundle>, BundleError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &BundleFilter) -> Result<Vec<Bundle>, BundleError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM bundles {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            BUNDLE_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_bundle)?;

        let mut bundles = Vec::new();
        for row in rows {
            bundles.push(row?);
        }
        Ok(bundles)
    }

    fn count(&self, filter: &BundleFilter) -> Result<i64, BundleError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM bundles {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn advance_stage(&self, id: &str, from: Stage, to: Stage) -> Result<Bundle, BundleError> {
        if to == Stage::Failed || !from.can_transition_to(to) {
            return Err(BundleError::InvalidTransition {
                bundle_id: id.to_string(),
                from,
                to,
            });
        }

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET stage = ?, updated_at = ? WHERE id = ? AND stage = ?",
            params![to.as_str(), format_timestamp(Utc::now()), id, from.as_str()],
        )?;

        if changed == 0 {
            return Err(Self::conflict(&conn, id, from));
        }

        Self::fetch(&conn, id)?.ok_or_else(|| BundleError::NotFound(id.to_string()))
    }

    fn fail(&self, id: &str, failure: BundleFailure) -> Result<Option<Bundle>, BundleError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET stage = 'failed', failure = ?, updated_at = ? WHERE id = ? AND stage NOT IN ('completed', 'failed')",
            params![to_json(&failure)?, format_timestamp(Utc::now()), id],
        )?;

        if changed == 1 {
            return Self::fetch(&conn, id);
        }

        match Self::fetch(&conn, id)? {
            Some(_) => Ok(None),
            None => Err(BundleError::NotFound(id.to_string())),
        }
    }

    fn complete(
        &self,
        id: &str,
        from: Stage,
        output: &OutputDescriptor,
    ) -> Result<Bundle, BundleError> {
        if !from.can_transition_to(Stage::Completed) {
            return Err(BundleError::InvalidTransition {
                bundle_id: id.to_string(),
                from,
                to: Stage::Completed,
            });
        }

        let conn = self.conn()?;
        let now = format_timestamp(Utc::now());
        let changed = conn.execute(
            "UPDATE bundles SET stage = 'completed', output = ?, updated_at = ?, completed_at = ? WHERE id = ? AND stage = ?",
            params![to_json(output)?, now, now, id, from.as_str()],
        )?;

        if changed == 0 {
            return Err(Self::conflict(&conn, id, from));
        }

        Self::fetch(&conn, id)?.ok_or_else(|| BundleError::NotFound(id.to_string()))
    }

    fn set_script(&self, id: &str, script: &Script) -> Result<(), BundleError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET script = ?, updated_at = ? WHERE id = ?",
            params![to_json(script)?, format_timestamp(Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(BundleError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_assets(&self, id: &str, assets: &AssetSlots) -> Result<(), BundleError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET assets = ?, updated_at = ? WHERE id = ?",
            params![to_json(assets)?, format_timestamp(Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(BundleError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn claim_gate(&self, id: &str, stage: Stage) -> Result<bool, BundleError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET gate_claim = ?1, updated_at = ?2 WHERE id = ?3 AND stage = ?1 AND (gate_claim IS NULL OR gate_claim <> ?1)",
            params![stage.as_str(), format_timestamp(Utc::now()), id],
        )?;
        Ok(changed == 1)
    }

    fn release_gate(&self, id: &str, stage: Stage) -> Result<bool, BundleError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bundles SET gate_claim = NULL, updated_at = ?1 WHERE id = ?2 AND stage = ?3 AND gate_claim = ?3",
            params![format_timestamp(Utc::now()), id, stage.as_str()],
        )?;
        Ok(changed == 1)
    }

    fn reserve_quota(&self, owner_id: &str, limit: u32) -> Result<bool, BundleError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO owner_usage (owner_id, bundles_created) VALUES (?, 0) ON CONFLICT(owner_id) DO NOTHING",
            params![owner_id],
        )?;
        let changed = conn.execute(
            "UPDATE owner_usage SET bundles_created = bundles_created + 1 WHERE owner_id = ?1 AND (?2 = 0 OR bundles_created < ?2)",
            params![owner_id, limit],
        )?;
        Ok(changed == 1)
    }

    fn release_quota(&self, owner_id: &str) -> Result<(), BundleError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE owner_usage SET bundles_created = bundles_created - 1 WHERE owner_id = ? AND bundles_created > 0",
            params![owner_id],
        )?;
        Ok(())
    }
}
