//! Suite Core Library
//!
//! Resolution, verification, versioning and publication for a suite of
//! interdependent packages, plus the orchestrator that sequences them.

pub mod advisor;
pub mod compliance;
pub mod config;
pub mod domain;
pub mod executor;
pub mod implement;
pub mod lock;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod plan_wait;
pub mod publish;
pub mod report;
pub mod resolver;
pub mod telemetry;
pub mod workspace;

pub use advisor::{NoopSplitAdvisor, SplitAdvisor, SplitSuggestion};

pub use compliance::{
    calculate_compliance_score, ComplianceGate, ComplianceLevel, ComplianceResult,
    ComplianceScore, LintResult, ScoreCategory, StructuralResult, TestResult, TypeCheckResult,
    WEIGHTS,
};

pub use config::{BackoffPolicy, SuiteConfig, Visibility};

pub use domain::{PackageNode, PublishError, ResolveError, Result, StepStatus, SuiteError};

pub use executor::{BuildExecutor, BuildOutcome, TestOutcome};

pub use implement::{CommandImplementationGenerator, ImplementationGenerator, ImplementationRequest};

pub use lock::WorkspaceLock;

pub use metrics::METRICS;

pub use orchestrator::{RunOptions, SuiteOrchestrator};

pub use plan_wait::{PlanPoller, PollOutcome, WaitDiagnosis};

pub use publish::{
    bump_version, propagate_to_dependents, ChangeType, CommandPublishTransport, DependentUpdate,
    PublishCoordinator, PublishOutcome, PublishReceipt, PublishTransport, Semver, VersionChange,
};

pub use report::{
    read_suite_report, write_suite_report, PackageOutcomeStatus, PackageReport, SuiteReport,
};

pub use telemetry::init_tracing;

pub use resolver::{DependencyResolver, DependencyTree, Resolution, Unresolved};

pub use workspace::{PackageManifest, PlanDocument};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
