//! Shared test utilities for gxt.

pub mod fixtures;
