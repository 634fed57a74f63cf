//! Shared CLI utilities for chain-importer crates: logging configuration.

pub mod tracing;

pub use tracing::{LogConfig, LogFormat, init_test_tracing};
