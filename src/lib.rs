//! gxt - deterministic hash-bucket experiment assignment.
//!
//! Experiments declare a randomization unit and weighted variants; gxt
//! compiles them into warehouse SQL that hashes each distinct unit into a
//! bucket in `[0, 1)` and maps buckets to variants through cumulative
//! intervals. The same unit, salt and precision always land in the same
//! variant.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod profiles;
pub mod project;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

pub use error::{GxtError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
