//! Plan requests: the unit of work the coordinator drains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two-tier queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Explicit request from a build that is blocked on the plan.
    High,
    /// Found by the coordinator's own discovery scan.
    Low,
}

/// Where a request came from.
pub const SOURCE_BUILD: &str = "build";
pub const SOURCE_DISCOVERY: &str = "discovery";
pub const SOURCE_CLI: &str = "cli";

/// "Package needs an implementation plan."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub package: String,
    /// Workflow (suite run) that asked for the plan.
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub source: String,
}

impl PlanRequest {
    /// High-priority request from a blocked build.
    pub fn from_build(package: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            requested_by: workflow_id.into(),
            created_at: Utc::now(),
            priority: Priority::High,
            source: SOURCE_BUILD.to_string(),
        }
    }

    /// Low-priority request found by discovery.
    pub fn discovered(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            requested_by: "plan-coordinator".to_string(),
            created_at: Utc::now(),
            priority: Priority::Low,
            source: SOURCE_DISCOVERY.to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_high(&self) -> bool {
        self.priority == Priority::High
    }
}
