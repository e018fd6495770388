//! Dependency resolution.
//!
//! `resolve` locates one package: plan documents first, then local
//! manifests (exact name, then substring), then the registry.
//! `build_dependency_tree` expands a locally present package into a flat
//! build order in which every dependency precedes its dependents. A
//! dependency that leads back to an ancestor aborts with a cycle error.
//!
//! A dependency found by substring match is recorded under the package's real
//! name: the dependent's dependency list is rewritten to it, and cycle and
//! visited checks compare real names only.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use suite_registry::{RegistryClient, RegistryRecord};
use tracing::{debug, warn};

use crate::config::SuiteConfig;
use crate::domain::{PackageNode, ResolveError, Result};
use crate::workspace::{self, PackageManifest, PlanDocument};

/// Where a package was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Source is present in the workspace.
    Local(PackageNode),
    /// A plan exists but the package has not been generated yet.
    Planned { plan: PlanDocument, package_dir: PathBuf },
    /// No plan anywhere; the registry record, if the registry knows it.
    Unplanned { record: Option<RegistryRecord> },
}

impl Resolution {
    pub fn is_local(&self) -> bool {
        matches!(self, Resolution::Local(_))
    }

    pub fn into_node(self) -> Option<PackageNode> {
        match self {
            Resolution::Local(node) => Some(node),
            _ => None,
        }
    }
}

/// A dependency that could not be found locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unresolved {
    pub name: String,
    /// Package that declared the dependency (`None` for the root).
    pub required_by: Option<String>,
    pub resolution: Resolution,
}

/// Result of expanding a package's dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyTree {
    /// Local packages, dependencies before dependents.
    pub order: Vec<PackageNode>,
    pub unresolved: Vec<Unresolved>,
}

impl DependencyTree {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|n| n.name.as_str()).collect()
    }
}

pub struct DependencyResolver {
    config: Arc<SuiteConfig>,
    registry: Arc<dyn RegistryClient>,
}

struct Frame {
    node: PackageNode,
    next: usize,
}

impl Frame {
    /// Replace the dependency just taken (`alias`) with `canonical`,
    /// dropping it instead when `canonical` is already listed.
    fn canonicalize_current(&mut self, alias: &str, canonical: &str) {
        let Some(idx) = self.next.checked_sub(1) else {
            return;
        };
        if self.node.dependencies.get(idx).map(String::as_str) != Some(alias) {
            return;
        }
        if self.node.dependencies.iter().any(|d| d == canonical) {
            self.node.dependencies.remove(idx);
            self.next = idx;
        } else {
            self.node.dependencies[idx] = canonical.to_string();
        }
    }
}

impl DependencyResolver {
    pub fn new(config: Arc<SuiteConfig>, registry: Arc<dyn RegistryClient>) -> Self {
        Self { config, registry }
    }

    fn node_for(&self, manifest: &PackageManifest) -> PackageNode {
        PackageNode::from_manifest(manifest, &self.config.scope, &self.config.package_manager)
    }

    /// Locate a single package. Never fails for "not found"; that is
    /// [`Resolution::Unplanned`].
    pub async fn resolve(&self, name: &str) -> Result<Resolution> {
        let root = &self.config.workspace_root;

        // 1. Plan document with a path declaration.
        let plan = workspace::find_plan_document(root, name)?;
        if let Some(plan) = &plan {
            let dir = plan.package_dir(root, name);
            if let Some(manifest) = PackageManifest::load_dir(&dir)? {
                if manifest.name() == Some(name) {
                    debug!(package = %name, path = %dir.display(), "resolved via plan path");
                    return Ok(Resolution::Local(self.node_for(&manifest)));
                }
            }
        }

        // 2. Local manifests: exact, then substring.
        let manifests = workspace::scan_manifests(root)?;
        let found = manifests
            .iter()
            .find(|m| m.name() == Some(name))
            .or_else(|| {
                manifests
                    .iter()
                    .find(|m| m.name().is_some_and(|n| n.contains(name)))
            });
        if let Some(manifest) = found {
            debug!(package = %name, path = %manifest.path().display(), "resolved via manifest");
            return Ok(Resolution::Local(self.node_for(manifest)));
        }

        if let Some(plan) = plan {
            let package_dir = plan.package_dir(root, name);
            return Ok(Resolution::Planned { plan, package_dir });
        }

        // 3. Registry.
        let record = match self.registry.get(name).await {
            Ok(record) => record,
            Err(e) => {
                warn!(package = %name, error = %e, "registry lookup failed during resolution");
                None
            }
        };
        match record {
            Some(record) if record.has_plan() => {
                let plan_path = record.plan_path.clone().unwrap_or_default();
                let plan_file = root.join(&plan_path);
                let plan = if plan_file.is_file() {
                    PlanDocument::read(plan_file)?
                } else {
                    PlanDocument {
                        path: plan_file,
                        declared_path: None,
                    }
                };
                let package_dir = plan.package_dir(root, name);
                Ok(Resolution::Planned { plan, package_dir })
            }
            record => Ok(Resolution::Unplanned { record }),
        }
    }

    /// Expand `root_name` into a dependency-ordered list of local packages.
    ///
    /// Each package is visited once. Missing packages are collected in
    /// [`DependencyTree::unresolved`] rather than failing the whole tree.
    pub async fn build_dependency_tree(&self, root_name: &str) -> Result<DependencyTree> {
        let mut tree = DependencyTree::default();

        let root = match self.resolve(root_name).await? {
            Resolution::Local(node) => node,
            other => {
                tree.unresolved.push(Unresolved {
                    name: root_name.to_string(),
                    required_by: None,
                    resolution: other,
                });
                return Ok(tree);
            }
        };

        let mut done: HashSet<String> = HashSet::new();
        let mut missing: HashSet<String> = HashSet::new();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut path: Vec<String> = vec![root.name.clone()];
        let mut stack = vec![Frame { node: root, next: 0 }];

        loop {
            let step = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next < frame.node.dependencies.len() => {
                    let dep = frame.node.dependencies[frame.next].clone();
                    frame.next += 1;
                    Some((dep, frame.node.name.clone()))
                }
                Some(_) => None,
            };

            let Some((declared, parent)) = step else {
                if let Some(frame) = stack.pop() {
                    path.pop();
                    done.insert(frame.node.name.clone());
                    tree.order.push(frame.node);
                }
                continue;
            };

            let dep = match aliases.get(&declared) {
                Some(canonical) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.canonicalize_current(&declared, canonical);
                    }
                    canonical.clone()
                }
                None => declared,
            };
            if done.contains(&dep) || missing.contains(&dep) {
                continue;
            }
            if let Some(start) = path.iter().position(|p| p == &dep) {
                let mut cycle = path[start..].to_vec();
                cycle.push(dep);
                return Err(ResolveError::Cycle { path: cycle }.into());
            }

            match self.resolve(&dep).await? {
                Resolution::Local(node) => {
                    if node.name != dep {
                        debug!(declared = %dep, package = %node.name, "dependency matched by substring");
                        if let Some(frame) = stack.last_mut() {
                            frame.canonicalize_current(&dep, &node.name);
                        }
                        aliases.insert(dep, node.name.clone());
                        if done.contains(&node.name) {
                            continue;
                        }
                        if let Some(start) = path.iter().position(|p| p == &node.name) {
                            let mut cycle = path[start..].to_vec();
                            cycle.push(node.name.clone());
                            return Err(ResolveError::Cycle { path: cycle }.into());
                        }
                    }
                    path.push(node.name.clone());
                    stack.push(Frame { node, next: 0 });
                }
                other => {
                    missing.insert(dep.clone());
                    tree.unresolved.push(Unresolved {
                        name: dep,
                        required_by: Some(parent),
                        resolution: other,
                    });
                }
            }
        }

        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use suite_registry::fakes::MemoryRegistry;
    use suite_registry::PackageStatus;

    fn write_pkg(root: &Path, dir: &str, name: &str, deps: &[&str]) {
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|d| (d.to_string(), serde_json::json!("^1.0.0")))
            .collect();
        let manifest = serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "dependencies": deps,
        });
        let path = root.join("packages").join(dir);
        std::fs::create_dir_all(&path).expect("mkdir");
        std::fs::write(path.join("package.json"), manifest.to_string()).expect("write");
    }

    fn resolver(root: &Path, registry: Arc<MemoryRegistry>) -> DependencyResolver {
        DependencyResolver::new(
            Arc::new(SuiteConfig::for_workspace(root).with_scope("@suite/")),
            registry,
        )
    }

    #[tokio::test]
    async fn test_topological_order_dependencies_first() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "app", "@suite/app", &["@suite/api", "@suite/ui"]);
        write_pkg(ws.path(), "api", "@suite/api", &["@suite/core", "@suite/log"]);
        write_pkg(ws.path(), "ui", "@suite/ui", &["@suite/core"]);
        write_pkg(ws.path(), "core", "@suite/core", &["@suite/log"]);
        write_pkg(ws.path(), "log", "@suite/log", &[]);

        let tree = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .build_dependency_tree("@suite/app")
            .await
            .expect("tree");

        assert!(tree.is_complete());
        assert_eq!(tree.order.len(), 5);
        for node in &tree.order {
            let at = tree.position(&node.name).expect("present");
            for dep in &node.dependencies {
                let dep_at = tree.position(dep).expect("dep present");
                assert!(dep_at < at, "{dep} must precede {}", node.name);
            }
        }
        assert_eq!(tree.order.last().map(|n| n.name.as_str()), Some("@suite/app"));
    }

    #[tokio::test]
    async fn test_cycle_is_an_error() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "a", "@suite/a", &["@suite/b"]);
        write_pkg(ws.path(), "b", "@suite/b", &["@suite/c"]);
        write_pkg(ws.path(), "c", "@suite/c", &["@suite/a"]);

        let err = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .build_dependency_tree("@suite/a")
            .await
            .unwrap_err();
        match err {
            crate::SuiteError::Resolve(ResolveError::Cycle { path }) => {
                assert_eq!(path, vec!["@suite/a", "@suite/b", "@suite/c", "@suite/a"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_self_dependency_is_a_cycle() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "a", "@suite/a", &["@suite/a"]);
        let result = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .build_dependency_tree("@suite/a")
            .await;
        assert!(matches!(
            result,
            Err(crate::SuiteError::Resolve(ResolveError::Cycle { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cycle_through_substring_alias_is_an_error() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "a", "@suite/a", &["@suite/core"]);
        write_pkg(ws.path(), "core-x", "@suite/core-x", &["@suite/core"]);

        let err = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .build_dependency_tree("@suite/a")
            .await
            .unwrap_err();
        match err {
            crate::SuiteError::Resolve(ResolveError::Cycle { path }) => {
                assert_eq!(path, vec!["@suite/core-x", "@suite/core-x"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_substring_dependency_is_recorded_under_real_name() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "app", "@suite/app", &["@suite/log", "@suite/api"]);
        write_pkg(ws.path(), "api", "@suite/api", &["@suite/logger", "@suite/log"]);
        write_pkg(ws.path(), "logger", "@suite/logger", &[]);

        let tree = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .build_dependency_tree("@suite/app")
            .await
            .expect("tree");
        let names: Vec<_> = tree.order.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["@suite/logger", "@suite/api", "@suite/app"]);
        assert_eq!(tree.order[1].dependencies, vec!["@suite/logger"]);
        assert_eq!(tree.order[2].dependencies, vec!["@suite/logger", "@suite/api"]);
        assert!(tree.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_is_collected_not_fatal() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "x", "@suite/x", &["@suite/y"]);
        let registry = Arc::new(MemoryRegistry::with_records([RegistryRecord::new("@suite/y")
            .with_status(PackageStatus::NeedsPlan)]));

        let tree = resolver(ws.path(), registry)
            .build_dependency_tree("@suite/x")
            .await
            .expect("tree");

        assert_eq!(tree.names(), vec!["@suite/x"]);
        assert_eq!(tree.unresolved.len(), 1);
        let missing = &tree.unresolved[0];
        assert_eq!(missing.name, "@suite/y");
        assert_eq!(missing.required_by.as_deref(), Some("@suite/x"));
        assert!(matches!(
            &missing.resolution,
            Resolution::Unplanned { record: Some(r) } if r.status == PackageStatus::NeedsPlan
        ));
    }

    #[tokio::test]
    async fn test_plan_document_without_source_is_planned() {
        let ws = tempfile::tempdir().expect("tempdir");
        let plans = ws.path().join("plans/packages");
        std::fs::create_dir_all(&plans).expect("mkdir");
        std::fs::write(plans.join("y.md"), "# Y\n\nPath: packages/libs/y\n").expect("write");

        let resolution = resolver(ws.path(), Arc::new(MemoryRegistry::new()))
            .resolve("@suite/y")
            .await
            .expect("resolve");
        match resolution {
            Resolution::Planned { package_dir, .. } => {
                assert_eq!(package_dir, ws.path().join("packages/libs/y"));
            }
            other => panic!("expected planned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_path_declaration_locates_package() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "libs/y", "@suite/y", &[]);
        let plans = ws.path().join("plans/packages");
        std::fs::create_dir_all(&plans).expect("mkdir");
        std::fs::write(plans.join("y.md"), "Path: packages/libs/y\n").expect("write");

        let registry = Arc::new(MemoryRegistry::new());
        let resolution = resolver(ws.path(), registry.clone())
            .resolve("@suite/y")
            .await
            .expect("resolve");
        let node = resolution.into_node().expect("local");
        assert_eq!(node.path, ws.path().join("packages/libs/y"));
        assert_eq!(registry.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_substring_match_after_exact() {
        let ws = tempfile::tempdir().expect("tempdir");
        write_pkg(ws.path(), "logger", "@suite/logger", &[]);
        write_pkg(ws.path(), "logger-core", "@suite/logger-core", &[]);

        let r = resolver(ws.path(), Arc::new(MemoryRegistry::new()));
        let exact = r.resolve("@suite/logger-core").await.expect("resolve");
        assert_eq!(exact.into_node().map(|n| n.name), Some("@suite/logger-core".to_string()));
        let fuzzy = r.resolve("logger-core").await.expect("resolve");
        assert_eq!(fuzzy.into_node().map(|n| n.name), Some("@suite/logger-core".to_string()));
    }

    #[tokio::test]
    async fn test_registry_plan_reference_is_planned() {
        let ws = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(MemoryRegistry::with_records([RegistryRecord::new("@suite/z")
            .with_plan("plans/packages/z.md", "plan/z")]));

        let resolution = resolver(ws.path(), registry)
            .resolve("@suite/z")
            .await
            .expect("resolve");
        match resolution {
            Resolution::Planned { plan, package_dir } => {
                assert_eq!(plan.path, ws.path().join("plans/packages/z.md"));
                assert_eq!(package_dir, ws.path().join("packages/z"));
            }
            other => panic!("expected planned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_unplanned() {
        let ws = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_offline(true);
        let resolution = resolver(ws.path(), registry)
            .resolve("@suite/ghost")
            .await
            .expect("resolve");
        assert_eq!(resolution, Resolution::Unplanned { record: None });
    }
}
