//! Project layout: experiment discovery and audience loading.
//!
//! ```text
//! <root>/
//!   gxt_project.yml
//!   profiles.yml
//!   experiments/<id>/config.yml
//!   experiments/<id>/audience.sql
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::core::experiment::ExperimentConfig;
use crate::engine::Engine;
use crate::error::{GxtError, Result};

pub const EXPERIMENTS_DIR: &str = "experiments";
pub const CONFIG_FILE: &str = "config.yml";
pub const AUDIENCE_FILE: &str = "audience.sql";

/// Ledger table name used when only a dataset is known.
pub const DEFAULT_LEDGER_TABLE: &str = "gxt_assignments";

static JINJA_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\{\{\s*source\s*\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)\s*\}\}"#)
        .expect("valid jinja source regex")
});

static LITERAL_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsource\s*\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("valid literal source regex")
});

/// An experiment directory and the outcome of loading its config.
#[derive(Debug)]
pub struct ExperimentEntry {
    pub id: String,
    pub dir: PathBuf,
    pub config: Result<ExperimentConfig>,
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn experiments_dir(&self) -> PathBuf {
        self.root.join(EXPERIMENTS_DIR)
    }

    /// Names of experiment directories, sorted.
    pub fn experiment_ids(&self) -> Result<Vec<String>> {
        let dir = self.experiments_dir();
        if !dir.is_dir() {
            return Err(GxtError::Config(format!(
                "no {EXPERIMENTS_DIR}/ directory found at {}",
                self.root.display()
            )));
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| GxtError::Io(err.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load and validate one experiment.
    pub fn load_experiment(&self, id: &str) -> Result<ExperimentConfig> {
        let dir = self.experiments_dir().join(id);
        if id.is_empty() || id.contains(['/', '\\']) || !dir.is_dir() {
            return Err(GxtError::ExperimentNotFound {
                experiment: id.to_string(),
                available: self.experiment_ids().unwrap_or_default(),
            });
        }
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Err(GxtError::InvalidExperiment {
                experiment: id.to_string(),
                reason: format!("missing {CONFIG_FILE}"),
            });
        }
        debug!(experiment = id, path = %path.display(), "loading experiment");
        ExperimentConfig::load(id, &path)
    }

    /// Every experiment with its load outcome; one broken config does not
    /// hide the others.
    pub fn experiments(&self) -> Result<Vec<ExperimentEntry>> {
        Ok(self
            .experiment_ids()?
            .into_iter()
            .map(|id| {
                let config = self.load_experiment(&id);
                ExperimentEntry {
                    dir: self.experiments_dir().join(&id),
                    id,
                    config,
                }
            })
            .collect())
    }

    /// Raw `audience.sql` for `id`.
    pub fn raw_audience(&self, id: &str) -> Result<String> {
        let path = self.experiments_dir().join(id).join(AUDIENCE_FILE);
        let missing = || GxtError::MissingAudience {
            experiment: id.to_string(),
            path: path.clone(),
        };
        if !path.is_file() {
            return Err(missing());
        }
        let sql = std::fs::read_to_string(&path)?;
        if sql.trim().trim_end_matches(';').trim().is_empty() {
            return Err(missing());
        }
        Ok(sql)
    }

    /// `audience.sql` for `id` with `source(...)` markers qualified for `engine`.
    pub fn audience_sql(&self, id: &str, engine: &dyn Engine) -> Result<String> {
        Ok(qualify_sources(&self.raw_audience(id)?, engine))
    }
}

/// Replace `{{ source('ds','table') }}` and `source('ds','table')` with the
/// engine's qualified identifier.
pub fn qualify_sources(sql: &str, engine: &dyn Engine) -> String {
    let qualify = |caps: &Captures<'_>| engine.qualify_table(&caps[1], &caps[2]);
    let sql = JINJA_SOURCE.replace_all(sql, qualify);
    LITERAL_SOURCE.replace_all(&sql, qualify).into_owned()
}

/// Ledger table for `experiment`: its own setting, then the project's, then
/// `<dataset>.gxt_assignments`.
pub fn resolve_assignments_table(
    experiment: &ExperimentConfig,
    config: &ProjectConfig,
    dataset: Option<&str>,
) -> Result<String> {
    experiment
        .assignments_table
        .clone()
        .or_else(|| config.assignments_table.clone())
        .or_else(|| dataset.map(|dataset| format!("{dataset}.{DEFAULT_LEDGER_TABLE}")))
        .ok_or_else(|| GxtError::MissingConfig("assignments_table".to_string()))
}
