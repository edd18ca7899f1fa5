//! Core experiment types and assignment logic

pub mod assignment;
pub mod bucket;
pub mod experiment;
pub mod variants;

pub use assignment::{AssignmentQuery, ClassifyArm, STAGES, clean_audience};
pub use bucket::{BucketHashRenderer, Precision, bucket_value, fingerprint};
pub use experiment::{ExperimentConfig, ExperimentMetadata, UnitColumn};
pub use variants::{Boundary, CumulativeInterval, Variant, VariantSet};
