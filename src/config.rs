//! Project configuration (`gxt_project.yml`).
//!
//! Layering, lowest to highest priority:
//! 1. built-in defaults
//! 2. user config (`~/.config/gxt/config.yml`)
//! 3. the project's `gxt_project.yml`
//! 4. an explicit `--config` file (or `GXT_CONFIG`)
//! 5. `GXT_*` environment overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::bucket::Precision;
use crate::error::{GxtError, Result};

/// File name of the project config at the project root.
pub const PROJECT_FILE: &str = "gxt_project.yml";

/// User config, relative to the platform config directory.
const USER_CONFIG_FILE: &str = "gxt/config.yml";

const DEFAULT_PROFILE: &str = "gxt_profile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub version: Option<String>,
    /// Profile in `profiles.yml` supplying engine settings.
    pub profile: String,
    /// Engine override; otherwise the profile's `type` decides.
    pub engine: Option<String>,
    /// Dataset override; otherwise the profile's `dataset`/`schema`.
    pub dataset: Option<String>,
    pub assignments_table: Option<String>,
    pub precision: Precision,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "gxt_project".to_string(),
            version: None,
            profile: DEFAULT_PROFILE.to_string(),
            engine: None,
            dataset: None,
            assignments_table: None,
            precision: Precision::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProjectConfigPatch {
    name: Option<String>,
    version: Option<String>,
    profile: Option<String>,
    engine: Option<String>,
    dataset: Option<String>,
    assignments_table: Option<String>,
    precision: Option<Precision>,
}

impl ProjectConfig {
    /// Load the layered config for the project at `root`.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        Self::load_with(
            explicit_path,
            root,
            dirs::config_dir().as_deref(),
            &|key| std::env::var(key).ok(),
        )
    }

    /// [`Self::load`] with the user config directory and environment supplied
    /// by the caller.
    pub fn load_with(
        explicit_path: Option<&Path>,
        root: &Path,
        user_config_dir: Option<&Path>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = user_config_dir {
            if let Some(global) = Self::load_patch(&dir.join(USER_CONFIG_FILE))? {
                config.merge_patch(global);
            }
        }
        if let Some(project) = Self::load_patch(&root.join(PROJECT_FILE))? {
            config.merge_patch(project);
        }

        let explicit = explicit_path.map(PathBuf::from).or_else(|| {
            lookup("GXT_CONFIG")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = explicit {
            let patch =
                Self::load_patch(&path)?.ok_or_else(|| GxtError::ConfigNotFound(path.clone()))?;
            config.merge_patch(patch);
        }

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ProjectConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| GxtError::Config(format!("read config {}: {err}", path.display())))?;
        let patch: Option<ProjectConfigPatch> = serde_yaml::from_str(&raw)
            .map_err(|err| GxtError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch.unwrap_or_default()))
    }

    fn merge_patch(&mut self, patch: ProjectConfigPatch) {
        if let Some(value) = patch.name {
            self.name = value;
        }
        if let Some(value) = patch.version {
            self.version = Some(value);
        }
        if let Some(value) = patch.profile {
            self.profile = value;
        }
        if let Some(value) = non_empty(patch.engine) {
            self.engine = Some(value);
        }
        if let Some(value) = non_empty(patch.dataset) {
            self.dataset = Some(value);
        }
        if let Some(value) = non_empty(patch.assignments_table) {
            self.assignments_table = Some(value);
        }
        if let Some(value) = patch.precision {
            self.precision = value;
        }
    }

    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        let patch = ProjectConfigPatch {
            profile: lookup("GXT_PROFILE"),
            engine: lookup("GXT_ENGINE"),
            dataset: lookup("GXT_DATASET"),
            assignments_table: lookup("GXT_ASSIGNMENTS_TABLE"),
            precision: parse_precision("GXT_PRECISION", lookup("GXT_PRECISION"))?,
            ..ProjectConfigPatch::default()
        };
        self.merge_patch(patch);
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_precision(key: &str, value: Option<String>) -> Result<Option<Precision>> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(Precision::new)
        .map(Some)
        .ok_or_else(|| GxtError::Config(format!("invalid {key} value {value}: expected a positive integer")))
}
