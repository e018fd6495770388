//! The plan-generation seam.
//!
//! The collaborator that actually writes a plan is external. The coordinator
//! only needs: package + dependency list + output location in, plan path and
//! branch reference out.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use suite_toolchain::{StageConfig, Toolchain};
use tracing::debug;

use crate::{CoordinatorError, CoordinatorResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGenerationRequest {
    pub package: String,
    pub dependencies: Vec<String>,
    pub output_path: PathBuf,
}

/// A written plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanArtifact {
    pub plan_path: String,
    pub branch_ref: String,
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, request: &PlanGenerationRequest) -> CoordinatorResult<PlanArtifact>;
}

/// Runs an external command to write the plan.
///
/// The command is invoked as
/// `<program> [args..] <package> <output_path> [dep,dep,..]` and must print a
/// `{"planPath": .., "branchRef": ..}` JSON object as its last stdout line.
pub struct CommandPlanGenerator {
    command: Vec<String>,
    toolchain: Arc<dyn Toolchain>,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl CommandPlanGenerator {
    pub fn new(command: Vec<String>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            command,
            toolchain,
            timeout_secs: 1800,
            working_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn stage_for(&self, request: &PlanGenerationRequest) -> StageConfig {
        let mut command = self.command.clone();
        command.push(request.package.clone());
        command.push(request.output_path.display().to_string());
        if !request.dependencies.is_empty() {
            command.push(request.dependencies.join(","));
        }
        let stage = StageConfig::custom("plan-generate".to_string(), command, self.timeout_secs);
        match &self.working_dir {
            Some(dir) => stage.in_dir(dir),
            None => stage,
        }
    }
}

#[async_trait]
impl PlanGenerator for CommandPlanGenerator {
    async fn generate(&self, request: &PlanGenerationRequest) -> CoordinatorResult<PlanArtifact> {
        let stage = self.stage_for(request);
        debug!(package = %request.package, command = %stage.display_command(), "generating plan");
        let result = self.toolchain.execute(&stage).await?;
        if !result.passed() {
            return Err(CoordinatorError::Generation {
                package: request.package.clone(),
                message: tail(&result.combined_output(), 20),
            });
        }
        parse_artifact(&result.stdout).ok_or_else(|| CoordinatorError::Generation {
            package: request.package.clone(),
            message: "generator printed no plan artifact".to_string(),
        })
    }
}

/// Last JSON object line of the generator's stdout.
fn parse_artifact(stdout: &str) -> Option<PlanArtifact> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
