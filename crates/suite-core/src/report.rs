//! Suite run report and its on-disk persistence.
//!
//! A [`SuiteReport`] lists every package the run touched with its terminal
//! status. Reports are written to `<dir>/<run_id>/suite-report.json` with a
//! companion `<dir>/<run_id>/suite-report.digest` holding the SHA-256 of the
//! package list; reading recomputes and verifies it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::advisor::SplitSuggestion;
use crate::compliance::ComplianceResult;
use crate::domain::{PackageNode, Result, SuiteError};
use crate::plan_wait::WaitDiagnosis;
use crate::publish::{PublishOutcome, VersionChange};

pub const REPORT_FILE: &str = "suite-report.json";
pub const DIGEST_FILE: &str = "suite-report.digest";

/// Where a package ended up in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageOutcomeStatus {
    Published,
    BlockedByQuality,
    FailedBuild,
    PublishFailed,
    AwaitingPlan,
    ResolutionFailed,
    /// Not attempted because a dependency did not publish.
    Skipped,
}

impl PackageOutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageOutcomeStatus::Published => "published",
            PackageOutcomeStatus::BlockedByQuality => "blocked_by_quality",
            PackageOutcomeStatus::FailedBuild => "failed_build",
            PackageOutcomeStatus::PublishFailed => "publish_failed",
            PackageOutcomeStatus::AwaitingPlan => "awaiting_plan",
            PackageOutcomeStatus::ResolutionFailed => "resolution_failed",
            PackageOutcomeStatus::Skipped => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PackageOutcomeStatus::Published)
    }
}

impl std::fmt::Display for PackageOutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageReport {
    pub name: String,
    pub status: PackageOutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<PackageNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_change: Option<VersionChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_diagnosis: Option<WaitDiagnosis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_suggestion: Option<SplitSuggestion>,
    /// Human-readable reason for any non-published status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PackageReport {
    pub fn new(name: impl Into<String>, status: PackageOutcomeStatus) -> Self {
        Self {
            name: name.into(),
            status,
            node: None,
            compliance: None,
            publish: None,
            version_change: None,
            wait_diagnosis: None,
            split_suggestion: None,
            detail: None,
        }
    }

    pub fn with_node(mut self, node: PackageNode) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn score(&self) -> Option<f64> {
        self.compliance.as_ref().map(|c| c.score.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// One entry per package, in the order the run reached a verdict.
    pub packages: Vec<PackageReport>,
}

impl SuiteReport {
    pub fn new(run_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            target: target.into(),
            started_at: Utc::now(),
            finished_at: None,
            packages: Vec::new(),
        }
    }

    /// Record a verdict, replacing an earlier one for the same package.
    pub fn record(&mut self, report: PackageReport) {
        match self.packages.iter_mut().find(|p| p.name == report.name) {
            Some(existing) => *existing = report,
            None => self.packages.push(report),
        }
    }

    pub fn package(&self, name: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<PackageOutcomeStatus> {
        self.package(name).map(|p| p.status)
    }

    pub fn count(&self, status: PackageOutcomeStatus) -> usize {
        self.packages.iter().filter(|p| p.status == status).count()
    }

    pub fn all_published(&self) -> bool {
        !self.packages.is_empty() && self.packages.iter().all(|p| p.status.is_success())
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|f| f.signed_duration_since(self.started_at).num_milliseconds().max(0) as u64)
    }

    /// SHA-256 hex digest of the serialized package list.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.packages)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Write `report` under `dir`; returns the path of the report file.
pub fn write_suite_report(report: &SuiteReport, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&report.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let report_path = run_dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&report_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), report.digest()?.as_bytes())?;

    Ok(report_path)
}

/// Read and verify the report for `run_id` under `dir`.
pub fn read_suite_report(run_id: &str, dir: &Path) -> Result<SuiteReport> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(REPORT_FILE))?;
    let report: SuiteReport = serde_json::from_slice(&json)?;

    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?
        .trim()
        .to_string();
    let actual = report.digest()?;
    if actual != expected {
        return Err(SuiteError::DigestMismatch { expected, actual });
    }
    Ok(report)
}
