//! Subprocess stage execution.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::stage::StageConfig;
use crate::{ToolchainError, ToolchainResult};

/// Result of a stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (0 = success, -1 = killed or timed out).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,

    /// Whether the stage hit its wall-clock bound.
    pub timed_out: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// stdout and stderr joined, for diagnosis and parsing.
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Result standing in for a stage that could not be executed at all.
    pub fn unrunnable(stage_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            exit_code: -1,
            stdout: String::new(),
            stderr: reason.into(),
            duration_ms: 0,
            success: false,
            timed_out: false,
        }
    }
}

/// Anything that can execute a stage: real subprocesses or a scripted double.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Execute a stage and report what happened.
    ///
    /// A non-zero exit or a timeout is a successful call with a failed
    /// [`StageResult`]; `Err` means the stage could not be started.
    async fn execute(&self, config: &StageConfig) -> ToolchainResult<StageResult>;
}

/// Runs stages as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Execute a single stage and return the result.
    pub async fn execute_stage(config: &StageConfig) -> ToolchainResult<StageResult> {
        let start = Instant::now();

        // Validate command
        if config.command.is_empty() {
            return Err(ToolchainError::EmptyCommand(config.name.clone()));
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        debug!(stage = %config.name, command = %config.display_command(), "spawning stage");
        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolchainError::ToolMissing {
                    stage: config.name.clone(),
                    program: exe.clone(),
                }
            } else {
                ToolchainError::Spawn {
                    stage: config.name.clone(),
                    source: e,
                }
            }
        })?;

        let output = if config.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    warn!(
                        stage = %config.name,
                        timeout_secs = config.timeout_secs,
                        "stage timed out"
                    );
                    return Ok(StageResult {
                        stage_name: config.name.clone(),
                        exit_code: -1,
                        stdout: String::new(),
                        stderr: format!(
                            "Stage {} timed out after {} seconds",
                            config.name, config.timeout_secs
                        ),
                        duration_ms: start.elapsed().as_millis() as u64,
                        success: false,
                        timed_out: true,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        Ok(StageResult {
            stage_name: config.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success: output.status.success(),
            timed_out: false,
        })
    }
}

#[async_trait]
impl Toolchain for ProcessRunner {
    async fn execute(&self, config: &StageConfig) -> ToolchainResult<StageResult> {
        Self::execute_stage(config).await
    }
}
