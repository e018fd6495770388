//! The implementation-generation seam.
//!
//! Turning a plan into source is an opaque external call. The orchestrator
//! hands over the package name, its plan and the directory the package
//! should live in, and expects a manifest in that directory afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use suite_toolchain::{StageConfig, Toolchain};
use tracing::debug;

use crate::domain::{Result, SuiteError};
use crate::workspace::MANIFEST_FILE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationRequest {
    pub package: String,
    pub plan_path: PathBuf,
    pub package_dir: PathBuf,
}

#[async_trait]
pub trait ImplementationGenerator: Send + Sync {
    /// Write the package described by `request.plan_path` into
    /// `request.package_dir`.
    async fn implement(&self, request: &ImplementationRequest) -> Result<()>;
}

/// Runs `<program> [args..] <package> <plan_path> <package_dir>`.
///
/// Success means exit code 0 and a manifest in `package_dir` afterwards.
pub struct CommandImplementationGenerator {
    command: Vec<String>,
    toolchain: Arc<dyn Toolchain>,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl CommandImplementationGenerator {
    pub fn new(command: Vec<String>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            command,
            toolchain,
            timeout_secs: 3600,
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

    fn stage_for(&self, request: &ImplementationRequest) -> StageConfig {
        let mut command = self.command.clone();
        command.push(request.package.clone());
        command.push(request.plan_path.display().to_string());
        command.push(request.package_dir.display().to_string());
        let stage = StageConfig::custom("implement".to_string(), command, self.timeout_secs);
        match &self.working_dir {
            Some(dir) => stage.in_dir(dir),
            None => stage,
        }
    }
}

#[async_trait]
impl ImplementationGenerator for CommandImplementationGenerator {
    async fn implement(&self, request: &ImplementationRequest) -> Result<()> {
        let stage = self.stage_for(request);
        debug!(package = %request.package, command = %stage.display_command(), "generating implementation");
        let result = self.toolchain.execute(&stage).await?;
        if !result.passed() {
            let output = result.combined_output();
            let lines: Vec<&str> = output.lines().collect();
            return Err(SuiteError::Implementation {
                package: request.package.clone(),
                message: lines[lines.len().saturating_sub(20)..].join("\n"),
            });
        }
        if !request.package_dir.join(MANIFEST_FILE).is_file() {
            return Err(SuiteError::Implementation {
                package: request.package.clone(),
                message: format!("no {MANIFEST_FILE} written to {}", request.package_dir.display()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use suite_toolchain::{StageResult, ToolchainResult};

    struct Scripted {
        exit_code: i32,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Toolchain for Scripted {
        async fn execute(&self, config: &StageConfig) -> ToolchainResult<StageResult> {
            self.seen.lock().expect("lock").push(config.command.clone());
            Ok(StageResult {
                stage_name: config.name.clone(),
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: "agent crashed".to_string(),
                duration_ms: 1,
                success: self.exit_code == 0,
                timed_out: false,
            })
        }
    }

    fn request(dir: &std::path::Path) -> ImplementationRequest {
        ImplementationRequest {
            package: "@suite/y".to_string(),
            plan_path: PathBuf::from("plans/packages/y.md"),
            package_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_command_shape_and_manifest_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let toolchain = Arc::new(Scripted {
            exit_code: 0,
            seen: Mutex::new(Vec::new()),
        });
        let generator = CommandImplementationGenerator::new(vec!["agent".into()], toolchain.clone());

        // Exit 0 but nothing written.
        let err = generator.implement(&request(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("package.json"));

        std::fs::write(dir.path().join("package.json"), "{}").expect("write");
        generator.implement(&request(dir.path())).await.expect("implemented");

        let seen = toolchain.seen.lock().expect("lock");
        assert_eq!(seen[0][0], "agent");
        assert_eq!(seen[0][1], "@suite/y");
        assert_eq!(seen[0][2], "plans/packages/y.md");
    }

    #[tokio::test]
    async fn test_failed_agent_is_implementation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = CommandImplementationGenerator::new(
            vec!["agent".into()],
            Arc::new(Scripted {
                exit_code: 1,
                seen: Mutex::new(Vec::new()),
            }),
        );
        let err = generator.implement(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, SuiteError::Implementation { .. }));
        assert!(err.to_string().contains("agent crashed"));
    }
}
