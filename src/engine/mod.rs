//! Execution engines: per-dialect bucket rendering plus the SQL glue the
//! ledger writer needs.
//!
//! Engines are looked up by name in an [`EngineRegistry`] and constructed
//! from the active [`EngineSettings`] (profile output), so nothing outside
//! this module branches on engine names.

pub mod bigquery;
pub mod generic;
pub mod sqlite;

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::core::assignment::{VARIANT_COLUMN, clean_audience};
use crate::core::bucket::BucketHashRenderer;
use crate::core::experiment::UnitColumn;
use crate::error::{GxtError, Result};

pub use bigquery::BigQueryEngine;
pub use generic::GenericEngine;
pub use sqlite::SqliteEngine;

/// Ledger primary key.
pub const LEDGER_KEYS: [&str; 2] = ["experiment_id", "unit"];
/// Ledger columns in insert order.
pub const LEDGER_COLUMNS: [&str; 4] = ["experiment_id", "unit", "variant", "assigned_at"];

/// Connection-free settings an engine is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub project: Option<String>,
    pub dataset: Option<String>,
    /// Database file for local engines.
    pub path: Option<String>,
}

/// A target execution engine.
pub trait Engine: BucketHashRenderer {
    /// Identifier for `table` inside `dataset`, as audience SQL should refer to it.
    fn qualify_table(&self, dataset: &str, table: &str) -> String;

    /// Fully qualify a configured table name (`table`, `dataset.table` or
    /// `project.dataset.table`), defaulting the dataset from settings.
    fn qualify_identifier(&self, identifier: &str) -> String;

    fn string_type(&self) -> &'static str;

    fn timestamp_type(&self) -> &'static str;

    fn current_timestamp(&self) -> &'static str;

    /// Whether gxt can run statements for this engine itself.
    fn can_execute(&self) -> bool {
        false
    }

    /// Local database file, for engines gxt executes against itself.
    fn database_path(&self) -> Option<&str> {
        None
    }

    /// `CREATE TABLE IF NOT EXISTS` for the assignment ledger.
    fn ledger_ddl(&self, table: &str) -> String {
        let string = self.string_type();
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n  experiment_id {string} NOT NULL,\n  unit {string} NOT NULL,\n  variant {string} NOT NULL,\n  assigned_at {}\n)",
            self.timestamp_type()
        )
    }

    /// Rows to persist for `experiment`, shaped like the ledger.
    ///
    /// Units with a NULL variant are never persisted.
    fn ledger_select(&self, experiment: &str, unit: &UnitColumn, assignment_sql: &str) -> String {
        format!(
            "SELECT\n  {} AS experiment_id,\n  CAST({unit} AS {}) AS unit,\n  {VARIANT_COLUMN} AS variant,\n  {} AS assigned_at\nFROM (\n{}\n) AS assignment\nWHERE {VARIANT_COLUMN} IS NOT NULL",
            self.quote_literal(experiment),
            self.string_type(),
            self.current_timestamp(),
            clean_audience(assignment_sql),
        )
    }

    /// Insert rows from `select` that are not yet in `target`; never update.
    fn insert_if_absent(&self, target: &str, select: &str, keys: &[&str], columns: &[&str]) -> String {
        let on = keys
            .iter()
            .map(|key| format!("T.{key} = S.{key}"))
            .join(" AND ");
        let values = columns
            .iter()
            .map(|column| format!("S.{column}"))
            .join(", ");
        format!(
            "MERGE INTO {target} T\nUSING (\n{}\n) S\nON {on}\nWHEN NOT MATCHED THEN\n  INSERT ({})\n  VALUES ({values})",
            clean_audience(select),
            columns.join(", "),
        )
    }
}

type EngineFactory = fn(&EngineSettings) -> Box<dyn Engine>;

/// Engines by lowercase name.
pub struct EngineRegistry {
    factories: BTreeMap<&'static str, EngineFactory>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.known())
            .finish()
    }
}

impl EngineRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every built-in engine.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(bigquery::NAME, |settings| {
            Box::new(BigQueryEngine::from_settings(settings))
        });
        registry.register(generic::NAME, |settings| {
            Box::new(GenericEngine::from_settings(settings))
        });
        registry.register(sqlite::NAME, |settings| {
            Box::new(SqliteEngine::from_settings(settings))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: EngineFactory) {
        self.factories.insert(name, factory);
    }

    #[must_use]
    pub fn known(&self) -> Vec<String> {
        self.factories.keys().map(|name| (*name).to_string()).collect()
    }

    /// Build the engine registered as `name` (case-insensitive).
    pub fn create(&self, name: &str, settings: &EngineSettings) -> Result<Box<dyn Engine>> {
        let key = name.trim().to_lowercase();
        let factory = self
            .factories
            .get(key.as_str())
            .ok_or_else(|| GxtError::UnknownEngine {
                engine: name.to_string(),
                known: self.known(),
            })?;
        Ok(factory(settings))
    }
}

/// Split `project.dataset.table` style identifiers, ignoring backquotes.
pub(crate) fn identifier_parts(identifier: &str) -> Vec<String> {
    identifier
        .replace('`', "")
        .split('.')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bucket::Precision;

    #[test]
    fn registry_knows_builtin_engines() {
        let registry = EngineRegistry::with_defaults();
        assert_eq!(registry.known(), vec!["bigquery", "generic", "sqlite"]);
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = EngineRegistry::with_defaults();
        let engine = registry.create("BigQuery", &EngineSettings::default()).unwrap();
        assert_eq!(engine.engine(), "bigquery");
    }

    #[test]
    fn unknown_engine_lists_known_names() {
        let registry = EngineRegistry::with_defaults();
        let err = registry
            .create("snowflake", &EngineSettings::default())
            .err()
            .unwrap();
        match err {
            GxtError::UnknownEngine { engine, known } => {
                assert_eq!(engine, "snowflake");
                assert_eq!(known.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn every_engine_renders_distinct_text_per_salt() {
        let registry = EngineRegistry::with_defaults();
        for name in registry.known() {
            let engine = registry.create(&name, &EngineSettings::default()).unwrap();
            let a = engine.render("user_id", "A", Precision::default());
            let b = engine.render("user_id", "B", Precision::default());
            let again = engine.render("user_id", "A", Precision::default());
            assert_ne!(a, b, "{name}");
            assert_eq!(a, again, "{name}");
            let unsalted = engine.render("user_id", "", Precision::default());
            assert!(!unsalted.contains("'::'"), "{name}: {unsalted}");
        }
    }

    #[test]
    fn merge_inserts_only_missing_rows() {
        let engine = GenericEngine::default();
        let sql = engine.insert_if_absent(
            "analytics.gxt_assignments",
            "SELECT 1;",
            &LEDGER_KEYS,
            &LEDGER_COLUMNS,
        );
        assert_eq!(
            sql,
            "MERGE INTO analytics.gxt_assignments T\nUSING (\nSELECT 1\n) S\nON T.experiment_id = S.experiment_id AND T.unit = S.unit\nWHEN NOT MATCHED THEN\n  INSERT (experiment_id, unit, variant, assigned_at)\n  VALUES (S.experiment_id, S.unit, S.variant, S.assigned_at)"
        );
        assert!(!sql.contains("UPDATE"));
    }

    #[test]
    fn identifier_parts_strip_quotes() {
        assert_eq!(identifier_parts("`p.d.t`"), vec!["p", "d", "t"]);
        assert_eq!(identifier_parts("t"), vec!["t"]);
    }
}
