//! Local SQLite engine.
//!
//! Buckets use the `gxt_fingerprint` scalar function registered on every
//! warehouse connection (see [`crate::storage::Warehouse`]). A SQLite file is
//! a single namespace, so dataset qualifiers are dropped.

use crate::core::bucket::{BucketHashRenderer, Precision, SALT_SEPARATOR};
use crate::engine::{Engine, EngineSettings, identifier_parts};

pub const NAME: &str = "sqlite";

/// Name of the registered fingerprint function.
pub const FINGERPRINT_FUNCTION: &str = "gxt_fingerprint";

/// Database file used when the profile does not set `path`.
pub const DEFAULT_DATABASE: &str = "target/gxt.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteEngine {
    path: String,
}

impl Default for SqliteEngine {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl SqliteEngine {
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            path: settings
                .path
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        }
    }

    /// Database path as configured, relative paths are resolved by the caller.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl BucketHashRenderer for SqliteEngine {
    fn engine(&self) -> &'static str {
        NAME
    }

    fn render(&self, column: &str, salt: &str, precision: Precision) -> String {
        let key = if salt.is_empty() {
            format!("CAST({column} AS TEXT)")
        } else {
            format!(
                "CAST({column} AS TEXT) || {} || {}",
                self.quote_literal(SALT_SEPARATOR),
                self.quote_literal(salt)
            )
        };
        format!("(abs({FINGERPRINT_FUNCTION}({key})) % {precision}) / {precision}.0")
    }
}

impl Engine for SqliteEngine {
    fn qualify_table(&self, _dataset: &str, table: &str) -> String {
        Self::quote_identifier(table)
    }

    fn qualify_identifier(&self, identifier: &str) -> String {
        identifier_parts(identifier)
            .last()
            .map_or_else(|| identifier.to_string(), |table| Self::quote_identifier(table))
    }

    fn string_type(&self) -> &'static str {
        "TEXT"
    }

    fn timestamp_type(&self) -> &'static str {
        "TEXT"
    }

    fn current_timestamp(&self) -> &'static str {
        "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
    }

    fn can_execute(&self) -> bool {
        true
    }

    fn database_path(&self) -> Option<&str> {
        Some(&self.path)
    }

    fn ledger_ddl(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n  experiment_id TEXT NOT NULL,\n  unit TEXT NOT NULL,\n  variant TEXT NOT NULL,\n  assigned_at TEXT NOT NULL,\n  PRIMARY KEY (experiment_id, unit)\n)"
        )
    }

    fn insert_if_absent(&self, target: &str, select: &str, keys: &[&str], columns: &[&str]) -> String {
        let columns = columns.join(", ");
        format!(
            "INSERT INTO {target} ({columns})\nSELECT {columns} FROM (\n{}\n) WHERE true\nON CONFLICT ({}) DO NOTHING",
            crate::core::assignment::clean_audience(select),
            keys.join(", "),
        )
    }
}
