//! Portable rendering for engines without a native fingerprint: a SHA-256
//! digest truncated to 15 hex digits (60 bits) and reduced modulo P.

use crate::core::bucket::{BucketHashRenderer, Precision, SALT_SEPARATOR};
use crate::engine::{Engine, EngineSettings, identifier_parts};

pub const NAME: &str = "generic";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericEngine {
    dataset: Option<String>,
}

impl GenericEngine {
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            dataset: settings.dataset.clone(),
        }
    }
}

impl BucketHashRenderer for GenericEngine {
    fn engine(&self) -> &'static str {
        NAME
    }

    fn render(&self, column: &str, salt: &str, precision: Precision) -> String {
        let key = if salt.is_empty() {
            format!("CAST({column} AS STRING)")
        } else {
            format!(
                "CONCAT(CAST({column} AS STRING),{},{})",
                self.quote_literal(SALT_SEPARATOR),
                self.quote_literal(salt)
            )
        };
        format!(
            "MOD(ABS(CAST(CONCAT('0x', SUBSTR(TO_HEX(SHA256({key})), 1, 15)) AS INT64)), {precision})/{precision}.0"
        )
    }
}

impl Engine for GenericEngine {
    fn qualify_table(&self, dataset: &str, table: &str) -> String {
        format!("{dataset}.{table}")
    }

    fn qualify_identifier(&self, identifier: &str) -> String {
        let parts = identifier_parts(identifier);
        match (parts.as_slice(), &self.dataset) {
            ([table], Some(dataset)) => self.qualify_table(dataset, table),
            _ => parts.join("."),
        }
    }

    fn string_type(&self) -> &'static str {
        "STRING"
    }

    fn timestamp_type(&self) -> &'static str {
        "TIMESTAMP"
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }
}
