//! Local SQLite warehouse: runs assignment SQL and maintains the ledger.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::assignment::{HASH_BUCKET_COLUMN, VARIANT_COLUMN, clean_audience};
use crate::core::bucket::fingerprint;
use crate::core::experiment::UnitColumn;
use crate::engine::sqlite::FINGERPRINT_FUNCTION;
use crate::error::Result;
use crate::storage::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// A SQLite database that assignment SQL runs against.
pub struct Warehouse {
    conn: Connection,
    path: Option<PathBuf>,
    schema_version: u32,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

/// One row of an assignment query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRow {
    pub unit: String,
    pub hash_bucket: Option<f64>,
    /// `None` when the bucket fell outside every interval.
    pub variant: Option<String>,
}

/// Units whose bucket matched no variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmatchedReport {
    pub count: u64,
    pub sample: Vec<String>,
}

/// Outcome of an insert-if-absent ledger write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// New rows written.
    pub inserted: u64,
    /// Candidate rows already present in the ledger.
    pub existing: u64,
    /// Existing rows whose stored variant differs from the recomputed one.
    pub drifted: u64,
}

/// A recorded ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub experiment_id: String,
    pub engine: String,
    pub assignments_table: String,
    pub sql_sha256: String,
    pub inserted: u64,
    pub existing: u64,
    pub drifted: u64,
    pub ran_at: String,
}

/// Persisted units per variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantCount {
    pub variant: String,
    pub units: u64,
}

impl Warehouse {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::from_connection(Connection::open(path)?, Some(path.to_path_buf()))
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::configure_pragmas(&conn)?;
        register_functions(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;
        debug!(path = ?path, schema_version, "opened warehouse");
        Ok(Self {
            conn,
            path,
            schema_version,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Run an assignment query and collect `(unit, hash_bucket, variant)` rows.
    pub fn preview(&self, assignment_sql: &str, unit: &UnitColumn, limit: usize) -> Result<Vec<AssignmentRow>> {
        let sql = format!(
            "SELECT {unit}, {HASH_BUCKET_COLUMN}, {VARIANT_COLUMN} FROM (\n{}\n) LIMIT ?",
            clean_audience(assignment_sql)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![to_i64(limit)], assignment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count units whose variant is NULL, with up to `sample` of them.
    pub fn unmatched(&self, assignment_sql: &str, unit: &UnitColumn, sample: usize) -> Result<UnmatchedReport> {
        let body = clean_audience(assignment_sql);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM (\n{body}\n) WHERE {VARIANT_COLUMN} IS NULL"),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {unit} FROM (\n{body}\n) WHERE {VARIANT_COLUMN} IS NULL ORDER BY {HASH_BUCKET_COLUMN} LIMIT ?"
        ))?;
        let units = stmt.query_map(params![to_i64(sample)], |row| {
            Ok(value_to_string(row.get_ref(0)?).unwrap_or_default())
        })?;

        Ok(UnmatchedReport {
            count: u64::try_from(count).unwrap_or(0),
            sample: units.collect::<rusqlite::Result<Vec<_>>>()?,
        })
    }

    /// Create the ledger table from engine DDL.
    pub fn ensure_ledger(&self, ddl: &str) -> Result<()> {
        self.conn.execute_batch(ddl)?;
        Ok(())
    }

    /// Whether a table named `name` exists.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Write `ledger_select` rows that are not yet in `table` via `insert_sql`.
    ///
    /// Counting and inserting happen in one IMMEDIATE transaction so that a
    /// concurrent writer is serialized behind this one.
    pub fn upsert_from_select(
        &mut self,
        table: &str,
        ledger_select: &str,
        insert_sql: &str,
    ) -> Result<UpsertOutcome> {
        let select = clean_audience(ledger_select);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: i64 =
            tx.query_row(&format!("SELECT COUNT(*) FROM (\n{select}\n)"), [], |row| row.get(0))?;
        let drifted: i64 = tx.query_row(
            &format!(
                "SELECT COUNT(*) FROM (\n{select}\n) AS s\nJOIN {table} AS t\n  ON t.experiment_id = s.experiment_id AND t.unit = s.unit\nWHERE t.variant <> s.variant"
            ),
            [],
            |row| row.get(0),
        )?;
        let inserted = tx.execute(insert_sql, [])?;
        tx.commit()?;

        let inserted = u64::try_from(inserted).unwrap_or(0);
        let candidates = u64::try_from(candidates).unwrap_or(0);
        let outcome = UpsertOutcome {
            inserted,
            existing: candidates.saturating_sub(inserted),
            drifted: u64::try_from(drifted).unwrap_or(0),
        };
        if outcome.drifted > 0 {
            warn!(
                table,
                drifted = outcome.drifted,
                "persisted assignments differ from recomputed variants; keeping persisted rows"
            );
        }
        info!(
            table,
            inserted = outcome.inserted,
            existing = outcome.existing,
            "ledger write complete"
        );
        Ok(outcome)
    }

    pub fn record_run(&self, run: &RunRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO gxt_runs (
                id, experiment_id, engine, assignments_table, sql_sha256,
                inserted, existing, drifted, ran_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                run.id,
                run.experiment_id,
                run.engine,
                run.assignments_table,
                run.sql_sha256,
                to_i64_u(run.inserted),
                to_i64_u(run.existing),
                to_i64_u(run.drifted),
                run.ran_at,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first, optionally for one experiment.
    pub fn recent_runs(&self, experiment: Option<&str>, limit: usize) -> Result<Vec<RunRecord>> {
        let mut sql = "SELECT id, experiment_id, engine, assignments_table, sql_sha256, \
                       inserted, existing, drifted, ran_at FROM gxt_runs"
            .to_string();
        if experiment.is_some() {
            sql.push_str(" WHERE experiment_id = ?");
        }
        sql.push_str(" ORDER BY ran_at DESC, rowid DESC LIMIT ?");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match experiment {
            Some(id) => stmt.query_map(params![id, to_i64(limit)], run_from_row)?,
            None => stmt.query_map(params![to_i64(limit)], run_from_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Persisted units per variant for `experiment` in `table`.
    pub fn ledger_summary(&self, table: &str, experiment: &str) -> Result<Vec<VariantCount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT variant, COUNT(*) FROM {table} WHERE experiment_id = ? GROUP BY variant ORDER BY variant"
        ))?;
        let rows = stmt.query_map([experiment], |row| {
            let units: i64 = row.get(1)?;
            Ok(VariantCount {
                variant: row.get(0)?,
                units: u64::try_from(units).unwrap_or(0),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }
}

/// Register `gxt_fingerprint(value)`, the local counterpart of
/// `FARM_FINGERPRINT`. Non-text values hash their text rendering.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        FINGERPRINT_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let bytes = match ctx.get_raw(0) {
                ValueRef::Null => return Ok(None),
                ValueRef::Integer(value) => value.to_string().into_bytes(),
                ValueRef::Real(value) => value.to_string().into_bytes(),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
            };
            Ok(Some(fingerprint(&bytes)))
        },
    )?;
    Ok(())
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
    Ok(AssignmentRow {
        unit: value_to_string(row.get_ref(0)?).unwrap_or_default(),
        hash_bucket: row.get(1)?,
        variant: row.get(2)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> {
        let value: i64 = row.get(idx)?;
        Ok(u64::try_from(value).unwrap_or(0))
    };
    Ok(RunRecord {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        engine: row.get(2)?,
        assignments_table: row.get(3)?,
        sql_sha256: row.get(4)?,
        inserted: count(5)?,
        existing: count(6)?,
        drifted: count(7)?,
        ran_at: row.get(8)?,
    })
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_i64_u(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
