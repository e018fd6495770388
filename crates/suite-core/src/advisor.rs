//! Responsibility-split advisor interface.
//!
//! Consulted for packages the gate blocks. An advisor may propose splitting
//! the package into smaller ones; the orchestrator only records the advice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceResult;
use crate::domain::PackageNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSuggestion {
    /// Names of the packages the advisor would carve out.
    pub proposed_packages: Vec<String>,
    pub rationale: String,
}

#[async_trait]
pub trait SplitAdvisor: Send + Sync {
    async fn advise(&self, node: &PackageNode, compliance: &ComplianceResult) -> Option<SplitSuggestion>;
}

/// Never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSplitAdvisor;

#[async_trait]
impl SplitAdvisor for NoopSplitAdvisor {
    async fn advise(&self, _node: &PackageNode, _compliance: &ComplianceResult) -> Option<SplitSuggestion> {
        None
    }
}
