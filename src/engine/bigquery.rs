//! BigQuery rendering: `FARM_FINGERPRINT` buckets, back-quoted identifiers
//! and an insert-only `MERGE` for the ledger.

use crate::core::bucket::{BucketHashRenderer, Precision, SALT_SEPARATOR};
use crate::engine::{Engine, EngineSettings, identifier_parts};

pub const NAME: &str = "bigquery";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BigQueryEngine {
    project: Option<String>,
    dataset: Option<String>,
}

impl BigQueryEngine {
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            project: settings.project.clone(),
            dataset: settings.dataset.clone(),
        }
    }

    fn backquote(parts: &[&str]) -> String {
        format!("`{}`", parts.join("."))
    }
}

impl BucketHashRenderer for BigQueryEngine {
    fn engine(&self) -> &'static str {
        NAME
    }

    fn render(&self, column: &str, salt: &str, precision: Precision) -> String {
        let key = if salt.is_empty() {
            column.to_string()
        } else {
            format!(
                "CONCAT(CAST({column} AS STRING),{},{})",
                self.quote_literal(SALT_SEPARATOR),
                self.quote_literal(salt)
            )
        };
        format!("MOD(ABS(FARM_FINGERPRINT({key})), {precision})/{precision}.0")
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

impl Engine for BigQueryEngine {
    fn qualify_table(&self, dataset: &str, table: &str) -> String {
        match &self.project {
            Some(project) => Self::backquote(&[project, dataset, table]),
            None => Self::backquote(&[dataset, table]),
        }
    }

    fn qualify_identifier(&self, identifier: &str) -> String {
        let parts = identifier_parts(identifier);
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        match refs.as_slice() {
            [_, _, _] | [_, _] => Self::backquote(&refs),
            [table] => match &self.dataset {
                Some(dataset) => self.qualify_table(dataset, table),
                None => Self::backquote(&refs),
            },
            _ => identifier.to_string(),
        }
    }

    fn string_type(&self) -> &'static str {
        "STRING"
    }

    fn timestamp_type(&self) -> &'static str {
        "TIMESTAMP"
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP()"
    }
}
