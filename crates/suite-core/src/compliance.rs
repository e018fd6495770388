//! Quality compliance gate.
//!
//! Four independent checks (structure, type-check, lint, tests) reduce to one
//! weighted score through [`calculate_compliance_score`], a pure function of
//! the check results. A check that cannot run scores zero in its category.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use suite_toolchain::{
    parse_eslint_output, parse_test_failures, parse_tsc_output, Diagnostic, ScriptKind, Severity,
    StageConfig, Toolchain,
};
use tracing::{debug, warn};

use crate::config::SuiteConfig;
use crate::domain::PackageNode;
use crate::executor::{BuildExecutor, TestOutcome};
use crate::workspace::PackageManifest;

// ---------------------------------------------------------------------------
// Weight table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Structure,
    TypeCheck,
    Lint,
    TestPass,
    Tests,
    Documentation,
    LintWarnings,
    CoverageThreshold,
}

/// Fixed category weights. They total exactly 100.
pub const WEIGHTS: [(ScoreCategory, f64); 8] = [
    (ScoreCategory::Structure, 10.0),
    (ScoreCategory::TypeCheck, 20.0),
    (ScoreCategory::Lint, 15.0),
    (ScoreCategory::TestPass, 15.0),
    (ScoreCategory::Tests, 25.0),
    (ScoreCategory::Documentation, 5.0),
    (ScoreCategory::LintWarnings, 5.0),
    (ScoreCategory::CoverageThreshold, 5.0),
];

pub fn weight(category: ScoreCategory) -> f64 {
    WEIGHTS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    Blocked,
    Acceptable,
    Good,
    Excellent,
}

impl ComplianceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            ComplianceLevel::Excellent
        } else if score >= 90.0 {
            ComplianceLevel::Good
        } else if score >= 85.0 {
            ComplianceLevel::Acceptable
        } else {
            ComplianceLevel::Blocked
        }
    }

    pub fn is_publishable(&self) -> bool {
        *self != ComplianceLevel::Blocked
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceLevel::Excellent => "excellent",
            ComplianceLevel::Good => "good",
            ComplianceLevel::Acceptable => "acceptable",
            ComplianceLevel::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Check results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralResult {
    pub missing_files: Vec<String>,
    pub invalid_fields: Vec<String>,
    /// Number of required files plus required fields checked.
    pub checked: usize,
    pub readme_present: bool,
}

impl StructuralResult {
    pub fn passed(&self) -> bool {
        self.missing_files.is_empty() && self.invalid_fields.is_empty()
    }

    /// Share of requirements met, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.checked == 0 {
            return 1.0;
        }
        let failed = (self.missing_files.len() + self.invalid_fields.len()).min(self.checked);
        (self.checked - failed) as f64 / self.checked as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeCheckResult {
    pub passed: bool,
    pub ran: bool,
    pub errors: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LintResult {
    pub passed: bool,
    pub ran: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub ran: bool,
    /// Line coverage percentage; `None` counts as zero.
    pub coverage: Option<f64>,
    pub failures: Vec<Diagnostic>,
}

impl TestResult {
    pub fn from_outcome(outcome: &TestOutcome) -> Self {
        let mut failures = parse_test_failures(&outcome.output);
        if !outcome.success && failures.is_empty() {
            failures.push(Diagnostic::error("", 0, failure_summary(&outcome.output)));
        }
        Self {
            passed: outcome.success,
            ran: outcome.ran,
            coverage: outcome.coverage,
            failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: ScoreCategory,
    pub weight: f64,
    pub earned: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceScore {
    /// 0-100, two decimals.
    pub total: f64,
    pub level: ComplianceLevel,
    pub breakdown: Vec<CategoryScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub structure: StructuralResult,
    pub type_check: TypeCheckResult,
    pub lint: LintResult,
    pub tests: TestResult,
    pub score: ComplianceScore,
}

impl ComplianceResult {
    pub fn level(&self) -> ComplianceLevel {
        self.score.level
    }

    pub fn is_publishable(&self) -> bool {
        self.score.level.is_publishable()
    }

    /// Every error-severity finding, for an external repair step.
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.type_check
            .errors
            .iter()
            .chain(self.lint.errors.iter())
            .chain(self.tests.failures.iter())
            .collect()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Weighted score of the four check results.
pub fn calculate_compliance_score(
    structure: &StructuralResult,
    type_check: &TypeCheckResult,
    lint: &LintResult,
    tests: &TestResult,
    coverage_threshold: f64,
) -> ComplianceScore {
    let coverage = if tests.passed {
        tests.coverage.unwrap_or(0.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let all = |on: bool| if on { 1.0 } else { 0.0 };

    let breakdown: Vec<CategoryScore> = WEIGHTS
        .iter()
        .map(|&(category, w)| {
            let share = match category {
                ScoreCategory::Structure => structure.fraction(),
                ScoreCategory::TypeCheck => all(type_check.ran && type_check.passed),
                ScoreCategory::Lint => all(lint.ran && lint.errors.is_empty() && lint.passed),
                ScoreCategory::TestPass => all(tests.ran && tests.passed),
                ScoreCategory::Tests => coverage / 100.0,
                ScoreCategory::Documentation => all(structure.readme_present),
                ScoreCategory::LintWarnings => {
                    if lint.ran {
                        ((w - lint.warnings.len() as f64) / w).max(0.0)
                    } else {
                        0.0
                    }
                }
                ScoreCategory::CoverageThreshold => {
                    all(tests.passed && coverage >= coverage_threshold)
                }
            };
            CategoryScore {
                category,
                weight: w,
                earned: round2(w * share),
            }
        })
        .collect();

    let total = round2(breakdown.iter().map(|c| c.earned).sum::<f64>());
    ComplianceScore {
        total,
        level: ComplianceLevel::from_score(total),
        breakdown,
    }
}

fn failure_summary(output: &str) -> String {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| "command failed without output".to_string())
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

const README_NAMES: [&str; 3] = ["README.md", "readme.md", "README"];

pub struct ComplianceGate {
    config: Arc<SuiteConfig>,
    toolchain: Arc<dyn Toolchain>,
}

impl ComplianceGate {
    pub fn new(config: Arc<SuiteConfig>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { config, toolchain }
    }

    /// File and manifest-field presence. Executes nothing.
    pub fn check_structure(&self, dir: &Path) -> StructuralResult {
        let mut result = StructuralResult {
            checked: self.config.required_files.len() + self.config.required_fields.len(),
            ..StructuralResult::default()
        };

        for file in &self.config.required_files {
            if !dir.join(file).is_file() {
                result.missing_files.push(file.clone());
            }
        }

        match PackageManifest::load_dir(dir) {
            Ok(Some(manifest)) => {
                for field in &self.config.required_fields {
                    if !manifest.has_field(field) {
                        result.invalid_fields.push(field.clone());
                    }
                }
            }
            Ok(None) => result
                .invalid_fields
                .extend(self.config.required_fields.iter().cloned()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "manifest unreadable");
                result
                    .invalid_fields
                    .extend(self.config.required_fields.iter().cloned());
            }
        }

        result.readme_present = README_NAMES.iter().any(|n| {
            std::fs::read_to_string(dir.join(n)).is_ok_and(|text| !text.trim().is_empty())
        });
        result
    }

    /// Stage for a package script, or the reason it cannot run.
    fn script_stage(&self, dir: &Path, kind: ScriptKind, timeout: u64) -> Result<StageConfig, String> {
        match PackageManifest::load_dir(dir) {
            Ok(Some(m)) if m.has_script(kind.script_name()) => Ok(StageConfig::for_script(
                kind,
                &self.config.package_manager,
                dir,
                timeout,
            )),
            Ok(Some(_)) => Err(format!("package has no \"{}\" script", kind.script_name())),
            Ok(None) => Err("package.json not found".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Run a script; `Err` carries the reason it could not be run.
    async fn run_script(&self, dir: &Path, kind: ScriptKind, timeout: u64) -> Result<(bool, String), String> {
        let stage = self.script_stage(dir, kind, timeout)?;
        let result = self
            .toolchain
            .execute(&stage)
            .await
            .map_err(|e| e.to_string())?;
        Ok((result.passed(), result.combined_output()))
    }

    pub async fn check_types(&self, dir: &Path) -> TypeCheckResult {
        match self
            .run_script(dir, ScriptKind::TypeCheck, self.config.type_check_timeout_secs)
            .await
        {
            Ok((passed, output)) => {
                let mut errors = parse_tsc_output(&output);
                if !passed && errors.is_empty() {
                    errors.push(Diagnostic::error("", 0, failure_summary(&output)));
                }
                TypeCheckResult {
                    passed: passed && errors.is_empty(),
                    ran: true,
                    errors,
                }
            }
            Err(reason) => TypeCheckResult {
                passed: false,
                ran: false,
                errors: vec![Diagnostic::error("package.json", 0, reason)],
            },
        }
    }

    pub async fn check_lint(&self, dir: &Path) -> LintResult {
        match self
            .run_script(dir, ScriptKind::Lint, self.config.lint_timeout_secs)
            .await
        {
            Ok((passed, output)) => {
                let (mut errors, warnings): (Vec<_>, Vec<_>) = parse_eslint_output(&output)
                    .into_iter()
                    .partition(|d| d.severity == Severity::Error);
                if !passed && errors.is_empty() {
                    errors.push(Diagnostic::error("", 0, failure_summary(&output)));
                }
                LintResult {
                    passed: passed && errors.is_empty(),
                    ran: true,
                    errors,
                    warnings,
                }
            }
            Err(reason) => LintResult {
                passed: false,
                ran: false,
                errors: vec![Diagnostic::error("package.json", 0, reason)],
                warnings: Vec::new(),
            },
        }
    }

    /// Run all four checks and score them. A test outcome the executor
    /// already produced is reused instead of running the suite again.
    pub async fn evaluate(
        &self,
        node: &PackageNode,
        executor: &BuildExecutor,
        test_outcome: Option<&TestOutcome>,
    ) -> ComplianceResult {
        let structure = self.check_structure(&node.path);
        let type_check = self.check_types(&node.path).await;
        let lint = self.check_lint(&node.path).await;
        let tests = match test_outcome {
            Some(outcome) => TestResult::from_outcome(outcome),
            None => TestResult::from_outcome(&executor.test(node).await),
        };

        let score = calculate_compliance_score(
            &structure,
            &type_check,
            &lint,
            &tests,
            self.config.coverage_threshold,
        );
        debug!(
            package = %node.name,
            score = score.total,
            level = %score.level,
            "compliance evaluated"
        );

        ComplianceResult {
            structure,
            type_check,
            lint,
            tests,
            score,
        }
    }
}
