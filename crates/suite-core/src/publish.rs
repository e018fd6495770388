//! Publish coordinator.
//!
//! - `bump_version`: pure semantic-version arithmetic
//! - `PublishCoordinator::publish`: guarded, single-shot registry publish
//! - `propagate_to_dependents`: exhaustive rewrite of dependents' manifests

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use suite_registry::{RegistryClient, RegistryUpdate};
use suite_toolchain::{StageConfig, Toolchain};
use tracing::{debug, info, warn};

use crate::config::{SuiteConfig, Visibility};
use crate::domain::{PublishError, Result, SuiteError};
use crate::workspace::{self, PackageManifest, DEPENDENCY_SECTIONS};

// ---------------------------------------------------------------------------
// Semver
// ---------------------------------------------------------------------------

/// MAJOR.MINOR.PATCH with an optional pre-release suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Semver {
    pub fn parse(input: &str) -> std::result::Result<Self, PublishError> {
        let invalid = || PublishError::InvalidVersion(input.to_string());
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        // Build metadata carries no precedence.
        let core = trimmed.split_once('+').map(|(v, _)| v).unwrap_or(trimmed);

        let (version_part, pre) = match core.split_once('-') {
            Some((v, p)) if !p.is_empty() => (v, Some(p.to_string())),
            Some(_) => return Err(invalid()),
            None => (core, None),
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let num = |s: &str| {
            if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
                return None;
            }
            s.parse::<u64>().ok()
        };
        Ok(Self {
            major: num(parts[0]).ok_or_else(invalid)?,
            minor: num(parts[1]).ok_or_else(invalid)?,
            patch: num(parts[2]).ok_or_else(invalid)?,
            pre,
        })
    }

    /// Next version for a change class. A pre-release bumps to its release.
    pub fn bump(&self, change: ChangeType) -> Self {
        let pre = self.pre.is_some();
        let (major, minor, patch) = match change {
            ChangeType::Major if pre && self.minor == 0 && self.patch == 0 => {
                (self.major, 0, 0)
            }
            ChangeType::Major => (self.major + 1, 0, 0),
            ChangeType::Minor if pre && self.patch == 0 => (self.major, self.minor, 0),
            ChangeType::Minor => (self.major, self.minor + 1, 0),
            ChangeType::Patch if pre => (self.major, self.minor, self.patch),
            ChangeType::Patch => (self.major, self.minor, self.patch + 1),
        };
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Change class separating `self` from a later `next`; `None` when equal.
    pub fn classify(&self, next: &Semver) -> Option<ChangeType> {
        if next == self {
            None
        } else if next.major != self.major {
            Some(ChangeType::Major)
        } else if next.minor != self.minor {
            Some(ChangeType::Minor)
        } else {
            Some(ChangeType::Patch)
        }
    }
}

impl std::fmt::Display for Semver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Major,
    Minor,
    Patch,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Major => "major",
            ChangeType::Minor => "minor",
            ChangeType::Patch => "patch",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = PublishError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "major" => Ok(ChangeType::Major),
            "minor" => Ok(ChangeType::Minor),
            "patch" => Ok(ChangeType::Patch),
            other => Err(PublishError::InvalidChangeType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `bump_version("1.2.3", "minor") == Ok("1.3.0")`.
pub fn bump_version(current: &str, change_type: &str) -> std::result::Result<String, PublishError> {
    let change: ChangeType = change_type.parse()?;
    Ok(Semver::parse(current)?.bump(change).to_string())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One dependent manifest rewritten by propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentUpdate {
    pub package: String,
    pub manifest_path: PathBuf,
    /// `dependencies` or `devDependencies`.
    pub section: String,
    pub previous_spec: String,
    pub new_spec: String,
}

/// Immutable record of one successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub package: String,
    pub previous: String,
    pub new: String,
    /// Absent when the package was published at its existing version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bump: Option<ChangeType>,
    pub dependents_updated: Vec<DependentUpdate>,
}

impl VersionChange {
    pub fn new(
        package: impl Into<String>,
        previous: impl Into<String>,
        new: impl Into<String>,
        dependents_updated: Vec<DependentUpdate>,
    ) -> Result<Self> {
        let previous = previous.into();
        let new = new.into();
        let bump = Semver::parse(&previous)?.classify(&Semver::parse(&new)?);
        Ok(Self {
            package: package.into(),
            previous,
            new,
            bump,
            dependents_updated,
        })
    }

    pub fn dependent_names(&self) -> Vec<&str> {
        self.dependents_updated
            .iter()
            .map(|d| d.package.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub success: bool,
    pub version: String,
    /// Registry location reported by the transport.
    pub location: Option<String>,
    /// The version was already out; no publish call was made.
    pub already_published: bool,
    pub dry_run: bool,
    pub error: Option<String>,
}

impl PublishOutcome {
    fn failed(version: &str, dry_run: bool, error: impl Into<String>) -> Self {
        Self {
            success: false,
            version: version.to_string(),
            location: None,
            already_published: false,
            dry_run,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub location: Option<String>,
}

/// The registry's publish endpoint.
#[async_trait]
pub trait PublishTransport: Send + Sync {
    async fn is_published(&self, name: &str, version: &str) -> Result<bool>;

    /// `Err` means the registry rejected (or never received) the publish.
    async fn publish(
        &self,
        package_dir: &Path,
        visibility: Visibility,
        dry_run: bool,
    ) -> Result<PublishReceipt>;
}

/// `<pm> publish` / `<pm> view` through the toolchain runner.
pub struct CommandPublishTransport {
    package_manager: String,
    toolchain: Arc<dyn Toolchain>,
    timeout_secs: u64,
}

impl CommandPublishTransport {
    pub fn new(package_manager: impl Into<String>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            package_manager: package_manager.into(),
            toolchain,
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl PublishTransport for CommandPublishTransport {
    async fn is_published(&self, name: &str, version: &str) -> Result<bool> {
        let stage = StageConfig::custom(
            "publish-check".to_string(),
            vec![
                self.package_manager.clone(),
                "view".to_string(),
                format!("{name}@{version}"),
                "version".to_string(),
            ],
            self.timeout_secs,
        );
        let result = self.toolchain.execute(&stage).await?;
        Ok(result.passed() && result.stdout.trim() == version)
    }

    async fn publish(
        &self,
        package_dir: &Path,
        visibility: Visibility,
        dry_run: bool,
    ) -> Result<PublishReceipt> {
        let mut command = vec![
            self.package_manager.clone(),
            "publish".to_string(),
            "--access".to_string(),
            visibility.as_str().to_string(),
        ];
        if dry_run {
            command.push("--dry-run".to_string());
        }
        let stage =
            StageConfig::custom("publish".to_string(), command, self.timeout_secs).in_dir(package_dir);
        let result = self.toolchain.execute(&stage).await?;
        if !result.passed() {
            return Err(SuiteError::Transport(result.combined_output()));
        }
        let location = result
            .combined_output()
            .split_whitespace()
            .find(|w| w.starts_with("https://"))
            .map(str::to_string);
        Ok(PublishReceipt { location })
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct PublishCoordinator {
    config: Arc<SuiteConfig>,
    registry: Arc<dyn RegistryClient>,
    transport: Arc<dyn PublishTransport>,
}

impl PublishCoordinator {
    pub fn new(
        config: Arc<SuiteConfig>,
        registry: Arc<dyn RegistryClient>,
        transport: Arc<dyn PublishTransport>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
        }
    }

    /// Whether `name@version` is already out, per registry record or transport.
    ///
    /// Lookup failures count as "not published"; the transport itself rejects
    /// a true duplicate.
    pub async fn is_already_published(&self, name: &str, version: &str) -> bool {
        match self.registry.get(name).await {
            Ok(Some(record)) if record.is_published_at(version) => return true,
            Ok(_) => {}
            Err(e) => warn!(package = %name, error = %e, "registry unavailable for publish guard"),
        }
        match self.transport.is_published(name, version).await {
            Ok(published) => published,
            Err(e) => {
                warn!(package = %name, error = %e, "publish transport check failed");
                false
            }
        }
    }

    /// Rewrite the manifest version and publish the package in `package_dir`.
    ///
    /// Registry rejection is an unsuccessful [`PublishOutcome`]; only a
    /// malformed version or an unreadable manifest is `Err`.
    pub async fn publish(
        &self,
        package_dir: &Path,
        version: &str,
        visibility: Visibility,
        dry_run: bool,
    ) -> Result<PublishOutcome> {
        Semver::parse(version)?;
        let mut manifest = PackageManifest::load_dir(package_dir)?
            .ok_or_else(|| SuiteError::manifest(package_dir.join("package.json"), "not found"))?;
        let name = manifest
            .name()
            .ok_or_else(|| SuiteError::manifest(manifest.path(), "missing \"name\""))?
            .to_string();

        if self.is_already_published(&name, version).await {
            info!(package = %name, version = %version, "already published; skipping");
            return Ok(PublishOutcome {
                success: true,
                version: version.to_string(),
                location: None,
                already_published: true,
                dry_run,
                error: None,
            });
        }

        let original = manifest.clone();
        manifest.set_version(version);
        manifest.save()?;

        let outcome = match self.transport.publish(package_dir, visibility, dry_run).await {
            Ok(receipt) => PublishOutcome {
                success: true,
                version: version.to_string(),
                location: receipt.location,
                already_published: false,
                dry_run,
                error: None,
            },
            Err(e) => {
                warn!(package = %name, version = %version, error = %e, "publish rejected");
                PublishOutcome::failed(version, dry_run, e.to_string())
            }
        };

        if dry_run || !outcome.success {
            original.save()?;
            return Ok(outcome);
        }

        if let Err(e) = self
            .registry
            .update(&name, &RegistryUpdate::published(version))
            .await
        {
            warn!(package = %name, error = %e, "published but registry record not updated");
        }
        info!(
            package = %name,
            version = %version,
            visibility = visibility.as_str(),
            "package published"
        );
        Ok(outcome)
    }

    /// [`propagate_to_dependents`] in this coordinator's workspace.
    pub fn propagate(&self, name: &str, new_version: &str) -> Result<Vec<DependentUpdate>> {
        propagate_to_dependents(name, new_version, &self.config.workspace_root)
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

const PROTOCOL_PREFIXES: [&str; 4] = ["workspace:", "file:", "link:", "portal:"];

/// New declared specifier for `old`, keeping its range operator.
///
/// `None` for local protocol specifiers, which never name a registry version.
pub fn rewrite_spec(old: &str, new_version: &str) -> Option<String> {
    let trimmed = old.trim();
    if PROTOCOL_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return None;
    }
    let operator_len = trimmed
        .find(|c: char| c.is_ascii_digit() || c == '*' || c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let operator = trimmed[..operator_len].trim_end();
    Some(format!("{operator}{new_version}"))
}

/// Point every dependent in the workspace at `new_version` of `name`.
///
/// Every manifest is visited, in both dependency tables. Manifests already
/// on the new specifier are left as they are and not reported.
pub fn propagate_to_dependents(
    name: &str,
    new_version: &str,
    workspace_root: &Path,
) -> Result<Vec<DependentUpdate>> {
    Semver::parse(new_version)?;
    let mut updates = Vec::new();

    for mut manifest in workspace::scan_manifests(workspace_root)? {
        if manifest.name() == Some(name) {
            continue;
        }
        let mut touched = false;
        for section in DEPENDENCY_SECTIONS {
            let Some(previous) = manifest.dependency_spec(section, name).map(str::to_string) else {
                continue;
            };
            let Some(new_spec) = rewrite_spec(&previous, new_version) else {
                debug!(section, spec = %previous, "local specifier left as is");
                continue;
            };
            if new_spec == previous {
                continue;
            }
            manifest.set_dependency_spec(section, name, &new_spec);
            touched = true;
            updates.push(DependentUpdate {
                package: manifest.name().unwrap_or_default().to_string(),
                manifest_path: manifest.path().to_path_buf(),
                section: section.to_string(),
                previous_spec: previous,
                new_spec,
            });
        }
        if touched {
            manifest.save()?;
        }
    }

    info!(
        package = %name,
        version = %new_version,
        dependents = updates.len(),
        "dependents updated"
    );
    Ok(updates)
}
