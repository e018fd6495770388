//! Suite toolchain - package build/test/lint/type-check invocation
//!
//! Provides:
//! - Stage definitions for the named scripts every package exposes
//! - A subprocess runner with a wall-clock bound per stage
//! - Parsers that turn tool output into normalised diagnostics

pub mod diagnostics;
pub mod runner;
pub mod stage;

use thiserror::Error;

// Re-export key types
pub use diagnostics::{
    parse_coverage, parse_eslint_output, parse_test_failures, parse_tsc_output, Diagnostic,
    Severity,
};
pub use runner::{ProcessRunner, StageResult, Toolchain};
pub use stage::{ScriptKind, StageConfig};

/// Reasons a stage could not be run at all.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("stage {0} has empty command")]
    EmptyCommand(String),

    #[error("stage {stage}: program '{program}' not found")]
    ToolMissing { stage: String, program: String },

    #[error("stage {stage}: failed to spawn: {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for toolchain operations.
pub type ToolchainResult<T> = std::result::Result<T, ToolchainError>;
