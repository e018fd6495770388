//! `PackageNode`: one package in a suite run's build plan.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use suite_toolchain::ScriptKind;

use crate::workspace::PackageManifest;

/// Progress of one pipeline step for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
}

impl StepStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            StepStatus::Passed
        } else {
            StepStatus::Failed
        }
    }
}

/// A package as discovered by the resolver and advanced by the pipeline.
///
/// Nodes are created once per run and never removed; the report keeps them
/// as the record of what happened to each package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    pub name: String,
    /// Package directory (the one holding `package.json`).
    pub path: PathBuf,
    pub version: String,
    /// Internal (in-scope) runtime dependencies, in manifest order.
    pub dependencies: Vec<String>,
    pub build_command: Vec<String>,
    pub test_command: Vec<String>,
    pub build_status: StepStatus,
    pub test_status: StepStatus,
}

impl PackageNode {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: version.into(),
            dependencies: Vec::new(),
            build_command: Vec::new(),
            test_command: Vec::new(),
            build_status: StepStatus::Pending,
            test_status: StepStatus::Pending,
        }
    }

    /// Node for a loaded manifest; only dependencies under `scope` are kept.
    pub fn from_manifest(manifest: &PackageManifest, scope: &str, package_manager: &str) -> Self {
        let name = manifest.name().unwrap_or_default().to_string();
        let version = manifest.version().unwrap_or("0.0.0").to_string();
        Self {
            dependencies: manifest.internal_dependencies(scope),
            build_command: ScriptKind::Build.command(package_manager),
            test_command: ScriptKind::Test.command(package_manager),
            ..Self::new(name, manifest.dir(), version)
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join("package.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_from_passed() {
        assert_eq!(StepStatus::from_passed(true), StepStatus::Passed);
        assert_eq!(StepStatus::from_passed(false), StepStatus::Failed);
        assert_eq!(StepStatus::default(), StepStatus::Pending);
    }

    #[test]
    fn test_node_from_manifest_keeps_only_scoped_runtime_deps() {
        let manifest = PackageManifest::from_value(
            "/ws/packages/cache/package.json",
            serde_json::json!({
                "name": "@suite/cache",
                "version": "0.4.0",
                "dependencies": { "@suite/logger": "^1.0.0", "lru-cache": "^10.0.0" },
                "devDependencies": { "@suite/test-kit": "^1.0.0" }
            }),
        )
        .expect("manifest");

        let node = PackageNode::from_manifest(&manifest, "@suite/", "pnpm");
        assert_eq!(node.name, "@suite/cache");
        assert_eq!(node.version, "0.4.0");
        assert_eq!(node.path, PathBuf::from("/ws/packages/cache"));
        assert_eq!(node.dependencies, vec!["@suite/logger"]);
        assert_eq!(node.build_command, vec!["pnpm", "run", "build"]);
        assert_eq!(node.test_command, vec!["pnpm", "run", "test"]);
        assert!(node.depends_on("@suite/logger"));
        assert!(!node.depends_on("@suite/test-kit"));
    }

    #[test]
    fn test_node_serde_uses_snake_case_status() {
        let node = PackageNode::new("@suite/a", "/ws/packages/a", "1.0.0");
        let json = serde_json::to_value(&node).expect("encode");
        assert_eq!(json["build_status"], "pending");
    }
}
