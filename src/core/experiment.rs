//! Experiment configuration (`experiments/<id>/config.yml`).
//!
//! The YAML is parsed into a loose shape first and then validated once into
//! [`ExperimentConfig`]; everything downstream works with the validated type.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};

use crate::core::assignment::{HASH_BUCKET_COLUMN, STAGES, VARIANT_COLUMN};
use crate::core::variants::{Variant, VariantSet};
use crate::error::{GxtError, Result};

/// The unit-identifier column, restricted to a plain SQL identifier so it can
/// be embedded unquoted in every stage of the assignment query.
///
/// Names the assignment query defines itself (the bucket and variant output
/// columns and the stage names) are rejected, compared case-insensitively
/// since warehouse identifiers are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitColumn(String);

impl UnitColumn {
    pub fn new(experiment: &str, column: &str) -> Result<Self> {
        let invalid = |reason: &str| GxtError::InvalidUnitColumn {
            experiment: experiment.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = column.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(invalid(if column.is_empty() {
                "missing"
            } else {
                "must be a plain identifier"
            }));
        }

        let reserved = [HASH_BUCKET_COLUMN, VARIANT_COLUMN]
            .into_iter()
            .find(|name| name.eq_ignore_ascii_case(column));
        if let Some(name) = reserved {
            return Err(invalid(&format!("collides with the generated {name} column")));
        }
        if let Some(stage) = STAGES.iter().find(|stage| stage.eq_ignore_ascii_case(column)) {
            return Err(invalid(&format!("collides with the {stage} query stage")));
        }

        Ok(Self(column.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for UnitColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct RawExperimentConfig {
    randomization_unit: Option<String>,
    #[serde(default)]
    variants: Vec<Variant>,
    description: Option<String>,
    owner: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    assignments_table: Option<String>,
    #[serde(default)]
    groups: Vec<serde_yaml::Value>,
}

/// Descriptive fields that never influence assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentMetadata {
    pub description: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub groups: usize,
}

/// A validated experiment.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    pub id: String,
    pub randomization_unit: UnitColumn,
    pub variants: VariantSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments_table: Option<String>,
    #[serde(flatten)]
    pub metadata: ExperimentMetadata,
}

impl ExperimentConfig {
    /// Build a config from its two assignment-relevant inputs.
    pub fn new(id: &str, randomization_unit: &str, variants: Vec<Variant>) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            randomization_unit: UnitColumn::new(id, randomization_unit)?,
            variants: VariantSet::new(id, variants)?,
            assignments_table: None,
            metadata: ExperimentMetadata::default(),
        })
    }

    /// Parse and validate `config.yml` contents for experiment `id`.
    pub fn from_yaml(id: &str, raw: &str) -> Result<Self> {
        let parsed: Option<RawExperimentConfig> =
            serde_yaml::from_str(raw).map_err(|err| GxtError::InvalidExperiment {
                experiment: id.to_string(),
                reason: err.to_string(),
            })?;
        let parsed = parsed.ok_or_else(|| GxtError::InvalidExperiment {
            experiment: id.to_string(),
            reason: "config.yml is empty".to_string(),
        })?;

        let unit = parsed
            .randomization_unit
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();

        let mut config = Self::new(id, unit, parsed.variants)?;
        config.assignments_table = parsed
            .assignments_table
            .filter(|table| !table.trim().is_empty());
        config.metadata = ExperimentMetadata {
            description: parsed.description,
            owner: parsed.owner,
            tags: parsed.tags,
            status: parsed.status,
            start_date: parsed.start_date,
            end_date: parsed.end_date,
            groups: parsed.groups.len(),
        };
        Ok(config)
    }

    /// Read and validate `path` as the config for experiment `id`.
    pub fn load(id: &str, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| GxtError::InvalidExperiment {
            experiment: id.to_string(),
            reason: format!("read {}: {err}", path.display()),
        })?;
        Self::from_yaml(id, &raw)
    }

    /// Salt used for bucket hashing: the experiment id.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.id
    }
}
