//! Per-invocation application context shared by every command.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::{Cli, OutputFormat};
use crate::config::ProjectConfig;
use crate::core::assignment::AssignmentQuery;
use crate::core::experiment::ExperimentConfig;
use crate::engine::{Engine, EngineRegistry, EngineSettings};
use crate::error::{GxtError, Result};
use crate::profiles::{self, ProfileOutput};
use crate::project::{self, Project};
use crate::storage::Warehouse;

#[derive(Debug)]
pub struct AppContext {
    /// Project root (directory holding `gxt_project.yml` and `experiments/`).
    pub root: PathBuf,
    pub project: Project,
    pub config: ProjectConfig,
    pub output_format: OutputFormat,
    pub registry: EngineRegistry,
    /// Active profile output, if `profiles.yml` defines one.
    pub profile: Option<ProfileOutput>,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli.project_path.clone();
        let config = ProjectConfig::load(cli.config.as_deref(), &root)?;
        Self::new(root, config, cli.output_format())
    }

    /// Context for `root` with an already-loaded config.
    pub fn new(root: impl Into<PathBuf>, config: ProjectConfig, output_format: OutputFormat) -> Result<Self> {
        let root = root.into();
        let profile = profiles::load_profile(&root, &config.profile)?;
        debug!(
            root = %root.display(),
            profile = %config.profile,
            target = profile.as_ref().map(|p| p.target.as_str()),
            "loaded project"
        );
        Ok(Self {
            project: Project::new(&root),
            root,
            config,
            output_format,
            registry: EngineRegistry::with_defaults(),
            profile,
        })
    }

    /// Engine name: `--engine`, then project config, then profile `type`.
    pub fn engine_name(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.config.engine.clone())
            .or_else(|| self.profile.as_ref().and_then(|p| p.engine.clone()))
            .ok_or_else(|| {
                GxtError::EngineNotConfigured(format!(
                    "no --engine flag, no `engine` in {}, and profile '{}' sets no type",
                    crate::config::PROJECT_FILE,
                    self.config.profile
                ))
            })
    }

    /// Settings for engine construction; project `dataset` wins over the profile's.
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = self
            .profile
            .as_ref()
            .map(|p| p.settings.clone())
            .unwrap_or_default();
        if let Some(dataset) = &self.config.dataset {
            settings.dataset = Some(dataset.clone());
        }
        settings
    }

    #[must_use]
    pub fn dataset(&self) -> Option<String> {
        self.engine_settings().dataset
    }

    pub fn engine(&self, requested: Option<&str>) -> Result<Box<dyn Engine>> {
        let name = self.engine_name(requested)?;
        self.registry.create(&name, &self.engine_settings())
    }

    /// Unqualified ledger table name for `experiment`.
    pub fn assignments_table(&self, experiment: &ExperimentConfig) -> Result<String> {
        project::resolve_assignments_table(experiment, &self.config, self.dataset().as_deref())
    }

    /// Assignment query for `experiment` on `engine`, salted with the experiment id.
    pub fn assignment_query(&self, experiment: &ExperimentConfig, engine: &dyn Engine) -> Result<AssignmentQuery> {
        let audience = self.project.audience_sql(&experiment.id, engine)?;
        let expression = engine.render(
            experiment.randomization_unit.as_str(),
            experiment.salt(),
            self.config.precision,
        );
        Ok(AssignmentQuery::synthesize(
            &audience,
            &expression,
            &experiment.randomization_unit,
            &experiment.variants,
            engine,
        ))
    }

    /// Open the local warehouse behind `engine`.
    pub fn open_warehouse(&self, engine: &dyn Engine) -> Result<Warehouse> {
        let path = engine
            .database_path()
            .filter(|_| engine.can_execute())
            .ok_or_else(|| GxtError::ExecutorUnavailable(engine.engine().to_string()))?;
        Warehouse::open(self.resolve(Path::new(path)))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
