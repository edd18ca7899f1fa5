//! Storage layer for gxt
//!
//! Local SQLite warehouse used to execute assignment SQL, hold the
//! assignment ledger and keep a log of ledger writes.

pub mod migrations;
pub mod sqlite;

use sha2::{Digest, Sha256};

pub use sqlite::{AssignmentRow, RunRecord, UnmatchedReport, UpsertOutcome, VariantCount, Warehouse};

/// Hex SHA-256 of a SQL statement, recorded with each run.
#[must_use]
pub fn sql_digest(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}
