use std::path::{Path, PathBuf};
use std::fmt::Write as _;

use tempfile::TempDir;

use crate::config::PROJECT_FILE;
use crate::profiles::PROFILES_FILE;
use crate::project::{AUDIENCE_FILE, CONFIG_FILE, EXPERIMENTS_DIR, Project};

/// Temporary gxt project directory.
pub struct ProjectFixture {
    pub temp_dir: TempDir,
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join(EXPERIMENTS_DIR))
            .expect("Failed to create experiments dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn project(&self) -> Project {
        Project::new(self.path())
    }

    /// Write a file relative to the project root.
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    /// Write `experiments/<id>/config.yml` and `audience.sql`.
    pub fn experiment(&self, id: &str, unit: &str, variants: &[(&str, f64)], audience: &str) {
        let mut config = format!("randomization_unit: {unit}\nvariants:\n");
        for (name, exposure) in variants {
            let _ = writeln!(config, "  - name: {name}\n    exposure: {exposure}");
        }
        self.create_file(&format!("{EXPERIMENTS_DIR}/{id}/{CONFIG_FILE}"), &config);
        self.create_file(&format!("{EXPERIMENTS_DIR}/{id}/{AUDIENCE_FILE}"), audience);
    }

    pub fn profiles(&self, content: &str) -> PathBuf {
        self.create_file(PROFILES_FILE, content)
    }

    pub fn project_config(&self, content: &str) -> PathBuf {
        self.create_file(PROJECT_FILE, content)
    }
}
