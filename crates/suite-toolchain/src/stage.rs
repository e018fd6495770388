//! Stage definitions and configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Named commands every package exposes through its manifest scripts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// `<pm> run build`
    Build,

    /// `<pm> run test`
    Test,

    /// `<pm> run lint`
    Lint,

    /// `<pm> run type-check`
    TypeCheck,
}

impl ScriptKind {
    /// Script key in the manifest's `scripts` table.
    pub fn script_name(&self) -> &'static str {
        match self {
            ScriptKind::Build => "build",
            ScriptKind::Test => "test",
            ScriptKind::Lint => "lint",
            ScriptKind::TypeCheck => "type-check",
        }
    }

    /// Command line for this script under a package manager.
    pub fn command(&self, package_manager: &str) -> Vec<String> {
        vec![
            package_manager.to_string(),
            "run".to_string(),
            self.script_name().to_string(),
        ]
    }

    pub fn all() -> [ScriptKind; 4] {
        [
            ScriptKind::Build,
            ScriptKind::Test,
            ScriptKind::Lint,
            ScriptKind::TypeCheck,
        ]
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Configuration for one subprocess stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Directory the command runs in (inherits the caller's when unset).
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,
}

impl StageConfig {
    /// Stage running a package script inside the package directory.
    pub fn for_script(
        kind: ScriptKind,
        package_manager: &str,
        package_dir: &Path,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: kind.script_name().to_string(),
            command: kind.command(package_manager),
            working_dir: Some(package_dir.to_path_buf()),
            timeout_secs,
            enabled: true,
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            working_dir: None,
            timeout_secs,
            enabled: true,
        }
    }

    /// Run in `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command rendered for logs.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_names() {
        assert_eq!(ScriptKind::Build.script_name(), "build");
        assert_eq!(ScriptKind::Test.script_name(), "test");
        assert_eq!(ScriptKind::Lint.script_name(), "lint");
        assert_eq!(ScriptKind::TypeCheck.script_name(), "type-check");
    }

    #[test]
    fn test_script_command_uses_package_manager() {
        let cmd = ScriptKind::TypeCheck.command("pnpm");
        assert_eq!(cmd, vec!["pnpm", "run", "type-check"]);
    }

    #[test]
    fn test_stage_config_for_script() {
        let config =
            StageConfig::for_script(ScriptKind::Lint, "npm", Path::new("/ws/packages/a"), 120);
        assert_eq!(config.name, "lint");
        assert_eq!(config.working_dir.as_deref(), Some(Path::new("/ws/packages/a")));
        assert_eq!(config.timeout_secs, 120);
        assert!(config.enabled);
        assert_eq!(config.display_command(), "npm run lint");
    }

    #[test]
    fn test_stage_config_custom_and_disabled() {
        let config = StageConfig::custom(
            "my_stage".to_string(),
            vec!["echo".to_string(), "hello".to_string()],
            60,
        )
        .disabled();
        assert_eq!(config.name, "my_stage");
        assert!(config.working_dir.is_none());
        assert!(!config.enabled);
    }
}
