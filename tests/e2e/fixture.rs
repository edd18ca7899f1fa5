//! Temporary gxt project wired to a local SQLite warehouse.

use std::path::{Path, PathBuf};

use gxt::app::AppContext;
use gxt::cli::commands::run::{ExecutedRun, RunArgs, execute};
use gxt::cli::output::OutputFormat;
use gxt::config::ProjectConfig;
use gxt::storage::{VariantCount, Warehouse};
use tempfile::TempDir;

pub const LEDGER: &str = "gxt_assignments";

pub struct E2EFixture {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl E2EFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("experiments")).expect("Failed to create experiments dir");
        Self { temp_dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    pub fn experiment(&self, id: &str, variants: &[(&str, f64)], audience: &str) {
        let mut config = String::from("randomization_unit: user_id\nvariants:\n");
        for (name, exposure) in variants {
            config.push_str(&format!("  - name: {name}\n    exposure: {exposure}\n"));
        }
        self.write(&format!("experiments/{id}/config.yml"), &config);
        self.write(&format!("experiments/{id}/audience.sql"), audience);
    }

    pub fn config() -> ProjectConfig {
        ProjectConfig {
            engine: Some("sqlite".into()),
            assignments_table: Some(LEDGER.into()),
            ..ProjectConfig::default()
        }
    }

    pub fn context(&self) -> AppContext {
        AppContext::new(&self.root, Self::config(), OutputFormat::Json).expect("Failed to build context")
    }

    /// Open the project's warehouse (default `target/gxt.db`).
    pub fn warehouse(&self) -> Warehouse {
        Warehouse::open(self.root.join("target/gxt.db")).expect("Failed to open warehouse")
    }

    /// Seed a `users` table with `user-0..user-{n}`.
    pub fn seed_users(&self, n: usize) {
        let warehouse = self.warehouse();
        warehouse
            .conn()
            .execute_batch("CREATE TABLE IF NOT EXISTS users (user_id TEXT NOT NULL)")
            .expect("Failed to create users");
        for idx in 0..n {
            warehouse
                .conn()
                .execute("INSERT INTO users (user_id) VALUES (?1)", [format!("user-{idx}")])
                .expect("Failed to insert user");
        }
    }

    pub fn execute(&self, ctx: &AppContext, experiment: &str) -> gxt::Result<ExecutedRun> {
        let config = ctx.project.load_experiment(experiment)?;
        let engine = ctx.engine(None)?;
        execute(ctx, &config, engine.as_ref(), &run_args(experiment))
    }

    pub fn summary(&self, experiment: &str) -> Vec<VariantCount> {
        self.warehouse()
            .ledger_summary(&format!("\"{LEDGER}\""), experiment)
            .expect("Failed to summarize ledger")
    }

    /// Ledger rows for `experiment` as `(unit, variant)`, ordered by unit.
    pub fn ledger(&self, experiment: &str) -> Vec<(String, String)> {
        let warehouse = self.warehouse();
        let mut stmt = warehouse
            .conn()
            .prepare(&format!(
                "SELECT unit, variant FROM {LEDGER} WHERE experiment_id = ?1 ORDER BY unit"
            ))
            .expect("Failed to prepare ledger query");
        stmt.query_map([experiment], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("Failed to query ledger")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to read ledger")
    }
}

pub fn run_args(experiment: &str) -> RunArgs {
    RunArgs {
        experiment: experiment.to_string(),
        engine: None,
        stage: None,
        execute: true,
        create_assignments_table: true,
        preview: 0,
    }
}
