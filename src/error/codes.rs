//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Experiment configuration errors
//! - 2xx: Engine errors
//! - 3xx: Project config errors
//! - 6xx: Storage errors
//! - 8xx: Validation and data-quality errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for machine output.
///
/// Each variant maps to a numeric code (e.g., `ExperimentNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Experiment errors (1xx)
    // ========================================
    /// E101: No experiment directory with that name
    ExperimentNotFound,
    /// E102: config.yml is unreadable or structurally invalid
    ExperimentInvalid,
    /// E103: Experiment declares no variants
    VariantsEmpty,
    /// E104: Variant exposures do not sum to 1.0
    ExposureSumInvalid,
    /// E105: Exposure is negative or not a finite number
    ExposureInvalid,
    /// E106: Two variants share a name
    VariantDuplicate,
    /// E107: Variant name is empty
    VariantNameEmpty,
    /// E108: randomization_unit is missing or not a plain identifier
    UnitColumnInvalid,
    /// E109: audience.sql is missing or empty
    AudienceMissing,

    // ========================================
    // Engine errors (2xx)
    // ========================================
    /// E201: Engine name is not registered
    EngineUnknown,
    /// E202: No engine could be resolved from flags, config or profile
    EngineNotConfigured,
    /// E203: Engine can render SQL but has no local executor
    ExecutorUnavailable,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: gxt_project.yml not found
    ConfigNotFound,
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,
    /// E303: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: SQLite operation failed
    DatabaseError,
    /// E602: JSON/YAML (de)serialization failed
    SerializationError,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: One or more experiments failed validation
    ValidationFailed,
    /// E802: Units fell outside every variant interval
    UnmatchedBucket,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ExperimentNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            // Experiment errors (1xx)
            Self::ExperimentNotFound => 101,
            Self::ExperimentInvalid => 102,
            Self::VariantsEmpty => 103,
            Self::ExposureSumInvalid => 104,
            Self::ExposureInvalid => 105,
            Self::VariantDuplicate => 106,
            Self::VariantNameEmpty => 107,
            Self::UnitColumnInvalid => 108,
            Self::AudienceMissing => 109,

            // Engine errors (2xx)
            Self::EngineUnknown => 201,
            Self::EngineNotConfigured => 202,
            Self::ExecutorUnavailable => 203,

            // Config errors (3xx)
            Self::ConfigNotFound => 301,
            Self::ConfigInvalid => 302,
            Self::ConfigMissingRequired => 303,

            // Storage errors (6xx)
            Self::DatabaseError => 601,
            Self::SerializationError => 602,

            // Validation errors (8xx)
            Self::ValidationFailed => 801,
            Self::UnmatchedBucket => 802,

            // Internal errors (9xx)
            Self::IoError => 901,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ExperimentNotFound => "Run `gxt list` to see the experiments under experiments/",
            Self::ExperimentInvalid => "Check config.yml for YAML syntax errors. Run `gxt validate` for details",
            Self::VariantsEmpty => "Declare at least one entry under `variants:` with a name and exposure",
            Self::ExposureSumInvalid => "Adjust variant exposures so they add up to exactly 1.0",
            Self::ExposureInvalid => "Exposures must be finite numbers between 0 and 1",
            Self::VariantDuplicate => "Give every variant a distinct name",
            Self::VariantNameEmpty => "Every variant needs a non-empty `name`",
            Self::UnitColumnInvalid => "Set `randomization_unit` to the unit column name returned by audience.sql",
            Self::AudienceMissing => "Create experiments/<name>/audience.sql selecting the randomization unit",

            Self::EngineUnknown => "Use one of the registered engines: bigquery, generic, sqlite",
            Self::EngineNotConfigured => "Pass --engine, set `engine` in gxt_project.yml, or configure profiles.yml",
            Self::ExecutorUnavailable => "Run without --execute to print the SQL, then run it in the warehouse",

            Self::ConfigNotFound => "Run gxt from a project root or pass --project-path <dir>",
            Self::ConfigInvalid => "Check YAML syntax in gxt_project.yml, profiles.yml or the --config file",
            Self::ConfigMissingRequired => "Set the missing value in gxt_project.yml or via its GXT_* environment variable",

            Self::DatabaseError => "Check that the ledger database path is writable and not locked by another process",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",

            Self::ValidationFailed => "Review the validation errors and fix each experiment. Run `gxt validate`",
            Self::UnmatchedBucket => "Some units matched no variant interval. Check exposures with `gxt show <experiment>`",

            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::ExperimentNotFound
            | Self::ExperimentInvalid
            | Self::VariantsEmpty
            | Self::ExposureSumInvalid
            | Self::ExposureInvalid
            | Self::VariantDuplicate
            | Self::VariantNameEmpty
            | Self::UnitColumnInvalid
            | Self::AudienceMissing
            | Self::EngineUnknown
            | Self::EngineNotConfigured
            | Self::ExecutorUnavailable
            | Self::ConfigNotFound
            | Self::ConfigInvalid
            | Self::ConfigMissingRequired
            | Self::ValidationFailed
            | Self::IoError => true,

            // These point at corrupted state or a bucketing defect
            Self::DatabaseError | Self::SerializationError | Self::UnmatchedBucket => false,
        }
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "experiment",
            2 => "engine",
            3 => "config",
            6 => "storage",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ExperimentNotFound,
            Self::ExperimentInvalid,
            Self::VariantsEmpty,
            Self::ExposureSumInvalid,
            Self::ExposureInvalid,
            Self::VariantDuplicate,
            Self::VariantNameEmpty,
            Self::UnitColumnInvalid,
            Self::AudienceMissing,
            Self::EngineUnknown,
            Self::EngineNotConfigured,
            Self::ExecutorUnavailable,
            Self::ConfigNotFound,
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::DatabaseError,
            Self::SerializationError,
            Self::ValidationFailed,
            Self::UnmatchedBucket,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
