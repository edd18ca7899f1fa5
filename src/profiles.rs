//! dbt-style `profiles.yml` loading.
//!
//! ```yaml
//! gxt_profile:
//!   target: dev
//!   outputs:
//!     dev:
//!       type: bigquery
//!       project: "{{ env_var('GCP_PROJECT', 'acme') }}"
//!       dataset: analytics
//! ```
//!
//! Only `type`, `project`, `dataset` (or `schema`) and `path` are read.
//! Credential keys and `location` are ignored.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::EngineSettings;
use crate::error::{GxtError, Result};

pub const PROFILES_FILE: &str = "profiles.yml";

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*env_var\(\s*['"]([^'"]+)['"]\s*(?:,\s*['"]([^'"]*)['"]\s*)?\)\s*\}\}"#)
        .expect("valid env_var regex")
});

/// The active output of a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOutput {
    pub profile: String,
    pub target: String,
    /// Engine name from the output's `type` key.
    pub engine: Option<String>,
    pub settings: EngineSettings,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    target: Option<String>,
    #[serde(default)]
    outputs: BTreeMap<String, RawOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOutput {
    #[serde(rename = "type")]
    engine: Option<String>,
    project: Option<String>,
    dataset: Option<String>,
    schema: Option<String>,
    path: Option<String>,
}

/// Substitute `{{ env_var('NAME') }}` and `{{ env_var('NAME', 'default') }}`.
///
/// Unset variables without a default render as an empty string.
pub fn render_env_vars(raw: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    ENV_VAR
        .replace_all(raw, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| {
                caps.get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            })
        })
        .into_owned()
}

/// Load the active output of `profile` from `<root>/profiles.yml`.
///
/// Returns `Ok(None)` when the file or the profile does not exist.
pub fn load_profile(root: &Path, profile: &str) -> Result<Option<ProfileOutput>> {
    load_profile_with(root, profile, &|key| std::env::var(key).ok())
}

pub fn load_profile_with(
    root: &Path,
    profile: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<ProfileOutput>> {
    let path = root.join(PROFILES_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "no profiles file");
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path)
        .map_err(|err| GxtError::Config(format!("read profiles {}: {err}", path.display())))?;
    let rendered = render_env_vars(&raw, lookup);
    let profiles: Option<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(&rendered)
        .map_err(|err| GxtError::Config(format!("parse profiles {}: {err}", path.display())))?;

    let Some(value) = profiles.unwrap_or_default().remove(profile) else {
        warn!(profile, path = %path.display(), "profile not found");
        return Ok(None);
    };
    let mut parsed: RawProfile = serde_yaml::from_value(value)
        .map_err(|err| GxtError::Config(format!("profile '{profile}': {err}")))?;

    let target = match parsed.target.clone() {
        Some(target) => target,
        None if parsed.outputs.len() == 1 => parsed.outputs.keys().next().cloned().unwrap_or_default(),
        None => {
            return Err(GxtError::Config(format!(
                "profile '{profile}' has several outputs but no target"
            )));
        }
    };
    let output = parsed.outputs.remove(&target).ok_or_else(|| {
        GxtError::Config(format!("profile '{profile}' has no output named '{target}'"))
    })?;

    Ok(Some(ProfileOutput {
        profile: profile.to_string(),
        target,
        engine: output.engine.filter(|e| !e.trim().is_empty()),
        settings: EngineSettings {
            project: output.project,
            dataset: output.dataset.or(output.schema),
            path: output.path,
        },
    }))
}
