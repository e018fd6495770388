//! Registry record shapes.
//!
//! The registry speaks camelCase JSON; every field other than `name` is
//! optional on the wire so partially indexed packages still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a package as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Known to the suite but has no implementation plan yet.
    NeedsPlan,
    /// A plan coordinator has picked the package up.
    Planning,
    /// The last generation attempt failed. Discovery skips it; only an
    /// explicit request retries.
    PlanFailed,
    /// A plan exists (`plan_path` is set).
    Planned,
    /// Source has been generated from the plan.
    Implemented,
    /// At least one version has been published.
    Published,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::NeedsPlan => "needs_plan",
            PackageStatus::Planning => "planning",
            PackageStatus::PlanFailed => "plan_failed",
            PackageStatus::Planned => "planned",
            PackageStatus::Implemented => "implemented",
            PackageStatus::Published => "published",
            PackageStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One package as the registry knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub plan_path: Option<String>,
    #[serde(default)]
    pub branch_ref: Option<String>,
    #[serde(default)]
    pub status: PackageStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RegistryRecord {
    /// Minimal record with no dependencies, unpublished and unplanned.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            is_published: false,
            version: None,
            plan_path: None,
            branch_ref: None,
            status: PackageStatus::Unknown,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, status: PackageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_plan(mut self, plan_path: impl Into<String>, branch_ref: impl Into<String>) -> Self {
        self.plan_path = Some(plan_path.into());
        self.branch_ref = Some(branch_ref.into());
        self
    }

    pub fn published_at(mut self, version: impl Into<String>) -> Self {
        self.is_published = true;
        self.version = Some(version.into());
        self
    }

    /// True when a plan reference has been recorded.
    pub fn has_plan(&self) -> bool {
        self.plan_path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// True when exactly `version` has been published.
    pub fn is_published_at(&self, version: &str) -> bool {
        self.is_published && self.version.as_deref() == Some(version)
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &RegistryUpdate) {
        if let Some(p) = update.is_published {
            self.is_published = p;
        }
        if let Some(v) = &update.version {
            self.version = Some(v.clone());
        }
        if let Some(p) = &update.plan_path {
            self.plan_path = Some(p.clone());
        }
        if let Some(b) = &update.branch_ref {
            self.branch_ref = Some(b.clone());
        }
        if let Some(s) = update.status {
            self.status = s;
        }
        if let Some(d) = &update.dependencies {
            self.dependencies = d.clone();
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Partial field update for `update(name, fields)`.
///
/// Only `Some` fields are sent; absent fields are left untouched by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PackageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

impl RegistryUpdate {
    /// Update recording a completed plan.
    pub fn plan_ready(plan_path: impl Into<String>, branch_ref: impl Into<String>) -> Self {
        Self {
            plan_path: Some(plan_path.into()),
            branch_ref: Some(branch_ref.into()),
            status: Some(PackageStatus::Planned),
            ..Self::default()
        }
    }

    /// Update recording a successful publish.
    pub fn published(version: impl Into<String>) -> Self {
        Self {
            is_published: Some(true),
            version: Some(version.into()),
            status: Some(PackageStatus::Published),
            ..Self::default()
        }
    }

    /// Status-only update.
    pub fn status(status: PackageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Entry returned by `getDependents(name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRef {
    pub name: String,
}

/// Entry returned by `queryByStatus(status)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMatch {
    pub name: String,
    #[serde(default)]
    pub plan_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decodes_with_missing_fields() {
        let json = r#"{"name":"@suite/logger","isPublished":true,"version":"1.2.0"}"#;
        let record: RegistryRecord = serde_json::from_str(json).expect("decode");
        assert_eq!(record.name, "@suite/logger");
        assert!(record.is_published_at("1.2.0"));
        assert!(record.dependencies.is_empty());
        assert_eq!(record.status, PackageStatus::Unknown);
        assert!(!record.has_plan());
    }

    #[test]
    fn test_unknown_status_string_decodes_as_unknown() {
        let json = r#"{"name":"a","status":"archived"}"#;
        let record: RegistryRecord = serde_json::from_str(json).expect("decode");
        assert_eq!(record.status, PackageStatus::Unknown);
    }

    #[test]
    fn test_update_skips_absent_fields() {
        let update = RegistryUpdate::plan_ready("plans/packages/logger.md", "plan/logger");
        let json = serde_json::to_value(&update).expect("encode");
        assert_eq!(json["planPath"], "plans/packages/logger.md");
        assert_eq!(json["status"], "planned");
        assert!(json.get("version").is_none());
        assert!(json.get("isPublished").is_none());
    }

    #[test]
    fn test_apply_update_only_touches_given_fields() {
        let mut record = RegistryRecord::new("a")
            .with_dependencies(vec!["b".into()])
            .with_status(PackageStatus::NeedsPlan);
        record.apply(&RegistryUpdate::published("1.0.0"));
        assert!(record.is_published_at("1.0.0"));
        assert_eq!(record.dependencies, vec!["b".to_string()]);
        assert_eq!(record.status, PackageStatus::Published);
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_blank_plan_path_is_not_a_plan() {
        let mut record = RegistryRecord::new("a");
        record.plan_path = Some("  ".into());
        assert!(!record.has_plan());
    }
}
