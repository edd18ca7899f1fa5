//! Error handling for gxt.
//!
//! This module provides:
//! - [`GxtError`]: The main error enum for all gxt operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestions and context

mod codes;
mod suggestions;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::{suggest_for_error, suggest_similar_experiments};

/// Main error type for gxt operations.
#[derive(Error, Debug)]
pub enum GxtError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Experiment not found: {experiment}")]
    ExperimentNotFound {
        experiment: String,
        available: Vec<String>,
    },

    #[error("Invalid experiment '{experiment}': {reason}")]
    InvalidExperiment { experiment: String, reason: String },

    #[error("Experiment '{experiment}' declares no variants")]
    EmptyVariants { experiment: String },

    #[error(
        "Variant exposures for experiment '{experiment}' sum to {sum}, expected 1.0 (tolerance 1e-6)"
    )]
    ExposureSum { experiment: String, sum: f64 },

    #[error("Variant '{variant}' in experiment '{experiment}' has invalid exposure {exposure}")]
    InvalidExposure {
        experiment: String,
        variant: String,
        exposure: f64,
    },

    #[error("Variant '{variant}' appears more than once in experiment '{experiment}'")]
    DuplicateVariant { experiment: String, variant: String },

    #[error("Variant #{position} in experiment '{experiment}' has an empty name")]
    EmptyVariantName { experiment: String, position: usize },

    #[error("Experiment '{experiment}' has invalid randomization_unit {column:?}: {reason}")]
    InvalidUnitColumn {
        experiment: String,
        column: String,
        reason: String,
    },

    #[error("Experiment '{experiment}' has no audience query at {}", .path.display())]
    MissingAudience { experiment: String, path: PathBuf },

    #[error("Unknown engine '{engine}' (known: {})", .known.join(", "))]
    UnknownEngine { engine: String, known: Vec<String> },

    #[error("No engine configured: {0}")]
    EngineNotConfigured(String),

    #[error("Engine '{0}' cannot execute SQL locally")]
    ExecutorUnavailable(String),

    #[error(
        "{unmatched} unit(s) in experiment '{experiment}' matched no variant interval (sample: {})",
        .sample.join(", ")
    )]
    UnmatchedBucket {
        experiment: String,
        unmatched: u64,
        sample: Vec<String>,
    },

    #[error("Validation failed: {} of {checked} experiment(s) invalid", .errors.len())]
    ValidationFailed { checked: usize, errors: Vec<String> },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Project config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Missing required config: {0}")]
    MissingConfig(String),
}

impl GxtError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Yaml(_) => ErrorCode::SerializationError,
            Self::ExperimentNotFound { .. } => ErrorCode::ExperimentNotFound,
            Self::InvalidExperiment { .. } => ErrorCode::ExperimentInvalid,
            Self::EmptyVariants { .. } => ErrorCode::VariantsEmpty,
            Self::ExposureSum { .. } => ErrorCode::ExposureSumInvalid,
            Self::InvalidExposure { .. } => ErrorCode::ExposureInvalid,
            Self::DuplicateVariant { .. } => ErrorCode::VariantDuplicate,
            Self::EmptyVariantName { .. } => ErrorCode::VariantNameEmpty,
            Self::InvalidUnitColumn { .. } => ErrorCode::UnitColumnInvalid,
            Self::MissingAudience { .. } => ErrorCode::AudienceMissing,
            Self::UnknownEngine { .. } => ErrorCode::EngineUnknown,
            Self::EngineNotConfigured(_) => ErrorCode::EngineNotConfigured,
            Self::ExecutorUnavailable(_) => ErrorCode::ExecutorUnavailable,
            Self::UnmatchedBucket { .. } => ErrorCode::UnmatchedBucket,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
        }
    }

    /// True for deterministic configuration failures caught before synthesis.
    ///
    /// These are never retried; [`GxtError::UnmatchedBucket`] is the only
    /// data-quality failure and is raised at execution time instead.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidExperiment { .. }
                | Self::EmptyVariants { .. }
                | Self::ExposureSum { .. }
                | Self::InvalidExposure { .. }
                | Self::DuplicateVariant { .. }
                | Self::EmptyVariantName { .. }
                | Self::InvalidUnitColumn { .. }
        )
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::ExperimentNotFound {
                experiment,
                available,
            } => Some(serde_json::json!({ "experiment": experiment, "available": available })),
            Self::InvalidExperiment { experiment, reason } => {
                Some(serde_json::json!({ "experiment": experiment, "reason": reason }))
            }
            Self::EmptyVariants { experiment } => {
                Some(serde_json::json!({ "experiment": experiment }))
            }
            Self::ExposureSum { experiment, sum } => {
                Some(serde_json::json!({ "experiment": experiment, "sum": sum }))
            }
            Self::InvalidExposure {
                experiment,
                variant,
                exposure,
            } => Some(serde_json::json!({
                "experiment": experiment,
                "variant": variant,
                "exposure": exposure,
            })),
            Self::DuplicateVariant {
                experiment,
                variant,
            } => Some(serde_json::json!({ "experiment": experiment, "variant": variant })),
            Self::EmptyVariantName {
                experiment,
                position,
            } => Some(serde_json::json!({ "experiment": experiment, "position": position })),
            Self::InvalidUnitColumn {
                experiment,
                column,
                reason,
            } => Some(serde_json::json!({
                "experiment": experiment,
                "column": column,
                "reason": reason,
            })),
            Self::MissingAudience { experiment, path } => Some(serde_json::json!({
                "experiment": experiment,
                "path": path.display().to_string(),
            })),
            Self::UnknownEngine { engine, known } => {
                Some(serde_json::json!({ "engine": engine, "known": known }))
            }
            Self::UnmatchedBucket {
                experiment,
                unmatched,
                sample,
            } => Some(serde_json::json!({
                "experiment": experiment,
                "unmatched": unmatched,
                "sample": sample,
            })),
            Self::ValidationFailed { checked, errors } => {
                Some(serde_json::json!({ "checked": checked, "errors": errors }))
            }
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_gxt_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "EXPOSURE_SUM_INVALID")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 104)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "experiment", "engine")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`GxtError`].
    #[must_use]
    pub fn from_gxt_error(err: &GxtError) -> Self {
        let code = err.code();
        let context = err.context();
        let suggestion = suggest_for_error(code, context.as_ref());

        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion,
            context,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }

    /// Add context to this error, regenerating the suggestion.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self.suggestion = suggest_for_error(self.code, self.context.as_ref());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&GxtError> for StructuredError {
    fn from(err: &GxtError) -> Self {
        Self::from_gxt_error(err)
    }
}

/// Result type alias using [`GxtError`].
pub type Result<T> = std::result::Result<T, GxtError>;
