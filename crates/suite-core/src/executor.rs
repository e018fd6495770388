//! Build executor: one direct, non-retrying invocation per step.
//!
//! A step that fails, times out, or cannot be started is reported as an
//! outcome with `success == false`; the executor never interprets why.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use suite_toolchain::{parse_coverage, ScriptKind, StageConfig, StageResult, Toolchain};
use tracing::{debug, warn};

use crate::config::SuiteConfig;
use crate::domain::PackageNode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub success: bool,
    pub duration_ms: u64,
    /// Combined stdout and stderr.
    pub output: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub duration_ms: u64,
    /// Line coverage percentage, when the test run printed a summary.
    pub coverage: Option<f64>,
    pub output: String,
    pub timed_out: bool,
    /// False when the test command could not be started at all.
    pub ran: bool,
}

pub struct BuildExecutor {
    config: Arc<SuiteConfig>,
    toolchain: Arc<dyn Toolchain>,
}

impl BuildExecutor {
    pub fn new(config: Arc<SuiteConfig>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { config, toolchain }
    }

    fn stage(&self, name: &str, command: &[String], kind: ScriptKind, dir: &Path, timeout: u64) -> StageConfig {
        if command.is_empty() {
            StageConfig::for_script(kind, &self.config.package_manager, dir, timeout)
        } else {
            StageConfig::custom(name.to_string(), command.to_vec(), timeout).in_dir(dir)
        }
    }

    async fn run(&self, stage: &StageConfig) -> (StageResult, bool) {
        match self.toolchain.execute(stage).await {
            Ok(result) => (result, true),
            Err(e) => {
                warn!(stage = %stage.name, error = %e, "stage could not be started");
                (StageResult::unrunnable(&stage.name, e.to_string()), false)
            }
        }
    }

    pub async fn build(&self, node: &PackageNode) -> BuildOutcome {
        let stage = self.stage(
            "build",
            &node.build_command,
            ScriptKind::Build,
            &node.path,
            self.config.build_timeout_secs,
        );
        let (result, _) = self.run(&stage).await;
        debug!(
            package = %node.name,
            success = result.passed(),
            duration_ms = result.duration_ms,
            "build finished"
        );
        BuildOutcome {
            success: result.passed(),
            duration_ms: result.duration_ms,
            output: result.combined_output(),
            timed_out: result.timed_out,
        }
    }

    pub async fn test(&self, node: &PackageNode) -> TestOutcome {
        let stage = self.stage(
            "test",
            &node.test_command,
            ScriptKind::Test,
            &node.path,
            self.config.test_timeout_secs,
        );
        let (result, ran) = self.run(&stage).await;
        let output = result.combined_output();
        let coverage = parse_coverage(&output);
        debug!(
            package = %node.name,
            success = result.passed(),
            coverage = ?coverage,
            "tests finished"
        );
        TestOutcome {
            success: result.passed(),
            duration_ms: result.duration_ms,
            coverage,
            output,
            timed_out: result.timed_out,
            ran,
        }
    }
}
