//! E2E test suite entry point.

mod assignment_workflow;
mod concurrency;
mod fixture;
mod stub_engine;
