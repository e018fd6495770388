//! Workspace layout: package manifests and plan documents.
//!
//! Manifests live under `packages/**/package.json`; plans under
//! `plans/packages/**/<unscoped-name>.md`. Manifests are edited through the
//! underlying JSON document so key order and unrelated fields survive a
//! rewrite.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::{Result, SuiteError};

pub const MANIFEST_FILE: &str = "package.json";
pub const PACKAGES_DIR: &str = "packages";
pub const PLANS_DIR: &str = "plans";

/// Dependency tables a dependent may declare an internal package in.
pub const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

const SKIP_DIRS: [&str; 3] = ["node_modules", "dist", "coverage"];

/// `@scope/name` -> `name`.
pub fn unscoped(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// A `package.json` on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl PackageManifest {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| SuiteError::manifest(&path, e.to_string()))?;
        Self::from_value(path, value)
    }

    pub fn from_value(path: impl Into<PathBuf>, value: Value) -> Result<Self> {
        let path = path.into();
        match value {
            Value::Object(doc) => Ok(Self { path, doc }),
            _ => Err(SuiteError::manifest(path, "manifest is not a JSON object")),
        }
    }

    /// Load `<dir>/package.json` if it exists.
    pub fn load_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Package directory.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    /// Present and not an empty string / array / object.
    pub fn has_field(&self, key: &str) -> bool {
        match self.doc.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }

    pub fn has_script(&self, script: &str) -> bool {
        self.doc
            .get("scripts")
            .and_then(|s| s.get(script))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// `(name, spec)` pairs of one dependency table.
    pub fn dependencies_in(&self, section: &str) -> Vec<(String, String)> {
        self.doc
            .get(section)
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Runtime dependencies whose names carry the suite scope prefix.
    pub fn internal_dependencies(&self, scope: &str) -> Vec<String> {
        self.dependencies_in("dependencies")
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name.starts_with(scope))
            .collect()
    }

    pub fn dependency_spec(&self, section: &str, name: &str) -> Option<&str> {
        self.doc.get(section)?.get(name)?.as_str()
    }

    /// Replace the specifier of an existing dependency. Returns false if absent.
    pub fn set_dependency_spec(&mut self, section: &str, name: &str, spec: &str) -> bool {
        match self
            .doc
            .get_mut(section)
            .and_then(Value::as_object_mut)
            .and_then(|deps| deps.get_mut(name))
        {
            Some(slot) => {
                *slot = Value::String(spec.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_version(&mut self, version: &str) {
        self.doc
            .insert("version".to_string(), Value::String(version.to_string()));
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.doc)?;
        text.push('\n');
        Ok(text)
    }

    pub fn save(&self) -> Result<()> {
        std::fs::write(&self.path, self.to_json_string()?)?;
        Ok(())
    }
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

/// Recursively collect files under `dir` accepted by `keep`, sorted by path.
fn collect_files(dir: &Path, keep: &dyn Fn(&Path) -> bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !skip_dir(name) {
                collect_files(&path, keep, out)?;
            }
        } else if keep(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Every manifest under `<root>/packages`, in path order.
///
/// A manifest that cannot be parsed is an error: a half-readable workspace
/// must not silently lose packages.
pub fn scan_manifests(root: &Path) -> Result<Vec<PackageManifest>> {
    let mut paths = Vec::new();
    collect_files(
        &root.join(PACKAGES_DIR),
        &|p| p.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE),
        &mut paths,
    )?;
    paths.into_iter().map(PackageManifest::load).collect()
}

/// Default directory for a package that does not exist yet.
pub fn default_package_dir(root: &Path, name: &str) -> PathBuf {
    root.join(PACKAGES_DIR).join(unscoped(name))
}

/// An implementation plan on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlanDocument {
    pub path: PathBuf,
    /// `Path: packages/...` declaration, relative to the workspace root.
    pub declared_path: Option<PathBuf>,
}

impl PlanDocument {
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        Ok(Self {
            declared_path: parse_declared_path(&text),
            path,
        })
    }

    /// Where the package described by this plan lives (or will live).
    pub fn package_dir(&self, root: &Path, name: &str) -> PathBuf {
        match &self.declared_path {
            Some(p) => root.join(p),
            None => default_package_dir(root, name),
        }
    }
}

fn declared_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Path: packages/core/cache   |  **Path:** `packages/cache`  |  - Path: packages/x/
        Regex::new(r"(?mi)^[\s>*-]*\**path\**\s*:\s*\**\s*`?(packages/[^`\s*]+?)/?`?\s*$")
            .unwrap_or_else(|e| unreachable!("plan path pattern is valid: {e}"))
    })
}

/// First `Path: packages/...` line of a plan document.
pub fn parse_declared_path(text: &str) -> Option<PathBuf> {
    declared_path_regex()
        .captures(text)
        .map(|cap| PathBuf::from(&cap[1]))
}

/// The plan document for `name`: `plans/packages/**/<unscoped>.md`.
pub fn find_plan_document(root: &Path, name: &str) -> Result<Option<PlanDocument>> {
    let file_name = format!("{}.md", unscoped(name));
    let mut paths = Vec::new();
    collect_files(
        &root.join(PLANS_DIR).join(PACKAGES_DIR),
        &|p| p.file_name().and_then(|n| n.to_str()) == Some(file_name.as_str()),
        &mut paths,
    )?;
    paths.into_iter().next().map(PlanDocument::read).transpose()
}
