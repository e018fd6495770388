//! Plan coordination for the suite build orchestrator
//!
//! Provides:
//! - `PlanRequest` and the two-tier `PlanQueue`
//! - Fire-and-forget signal transports (in-process channel, on-disk spool)
//! - The `PlanGenerator` seam over the external plan-writing collaborator
//! - `PlanCoordinator`, the long-running drain/discover loop

pub mod generator;
pub mod queue;
pub mod request;
pub mod service;
pub mod signal;

use suite_registry::RegistryError;
use suite_toolchain::ToolchainError;
use thiserror::Error;

// Re-export key types
pub use generator::{CommandPlanGenerator, PlanArtifact, PlanGenerationRequest, PlanGenerator};
pub use queue::{Enqueued, PlanQueue};
pub use request::{PlanRequest, Priority, SOURCE_BUILD, SOURCE_CLI, SOURCE_DISCOVERY};
pub use service::{
    CoordinatorConfig, CoordinatorState, CoordinatorStats, PlanCoordinator, StatsSnapshot,
    COORDINATOR_LOCK_FILE,
};
pub use signal::{drain_spool, ChannelSignal, PlanSignal, SpoolSignal, SPOOL_DIR};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("plan generation failed for {package}: {message}")]
    Generation { package: String, message: String },

    #[error("plan coordinator is not accepting signals")]
    SignalClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
