//! Suite run configuration.
//!
//! `SuiteConfig::default()` reads the environment; every field can then be
//! overridden with a `with_*` builder. Nothing here touches the network or
//! the filesystem.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Registry visibility for a published package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Restricted => "restricted",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "restricted" | "private" => Ok(Visibility::Restricted),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// Geometric backoff with a delay cap and an attempt ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            factor: 1.5,
            max_delay: Duration::from_secs(60),
            max_attempts: 20,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, factor: f64, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            factor,
            max_delay,
            max_attempts,
        }
    }

    /// Delay to wait after the `attempt`-th (0-based) empty poll.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let secs = self.base.as_secs_f64() * factor.powi(attempt.min(i32::MAX as u32) as i32);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// The full delay schedule, one entry per attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(move |n| self.delay(n))
    }

    /// Upper bound on the time a full schedule can sleep.
    pub fn total(&self) -> Duration {
        self.delays().sum()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub workspace_root: PathBuf,
    /// Internal dependency prefix, e.g. `@suite/`.
    pub scope: String,
    pub package_manager: String,

    pub build_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub lint_timeout_secs: u64,
    pub type_check_timeout_secs: u64,
    pub publish_timeout_secs: u64,

    /// Poll schedule while waiting for a plan to appear.
    pub plan_backoff: BackoffPolicy,

    pub visibility: Visibility,
    pub dry_run: bool,

    /// Files the structural check requires, relative to the package dir.
    pub required_files: Vec<String>,
    /// Manifest fields the structural check requires.
    pub required_fields: Vec<String>,
    /// Line coverage (percent) needed for the coverage-threshold category.
    pub coverage_threshold: f64,

    /// Acquire / re-resolve rounds before giving up on missing packages.
    pub max_resolution_rounds: u32,

    pub lock_backoff: BackoffPolicy,

    /// Where suite reports are persisted; `None` keeps them in memory only.
    pub report_dir: Option<PathBuf>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(env_or("SUITE_WORKSPACE", ".")),
            scope: env_or("SUITE_SCOPE", "@suite/"),
            package_manager: env_or("SUITE_PACKAGE_MANAGER", "npm"),
            build_timeout_secs: env_parse("SUITE_BUILD_TIMEOUT_SECS", 600),
            test_timeout_secs: env_parse("SUITE_TEST_TIMEOUT_SECS", 900),
            lint_timeout_secs: env_parse("SUITE_LINT_TIMEOUT_SECS", 300),
            type_check_timeout_secs: env_parse("SUITE_TYPE_CHECK_TIMEOUT_SECS", 300),
            publish_timeout_secs: env_parse("SUITE_PUBLISH_TIMEOUT_SECS", 300),
            plan_backoff: BackoffPolicy::default(),
            visibility: env_or("SUITE_VISIBILITY", "public")
                .parse()
                .unwrap_or_default(),
            dry_run: env_parse("SUITE_DRY_RUN", false),
            required_files: vec![
                "package.json".to_string(),
                "README.md".to_string(),
                "tsconfig.json".to_string(),
                "src/index.ts".to_string(),
            ],
            required_fields: vec![
                "name".to_string(),
                "version".to_string(),
                "description".to_string(),
                "main".to_string(),
                "types".to_string(),
                "scripts".to_string(),
            ],
            coverage_threshold: 80.0,
            max_resolution_rounds: 5,
            lock_backoff: BackoffPolicy::new(
                Duration::from_millis(200),
                2.0,
                Duration::from_secs(5),
                30,
            ),
            report_dir: std::env::var("SUITE_REPORT_DIR").ok().map(PathBuf::from),
        }
    }
}

impl SuiteConfig {
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_package_manager(mut self, pm: impl Into<String>) -> Self {
        self.package_manager = pm.into();
        self
    }

    pub fn with_plan_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.plan_backoff = policy;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_coverage_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    pub fn with_max_resolution_rounds(mut self, rounds: u32) -> Self {
        self.max_resolution_rounds = rounds;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Whether `name` is an internal package of this suite.
    pub fn is_internal(&self, name: &str) -> bool {
        name.starts_with(&self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_grows_and_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(delays.len(), 20);
        assert_eq!(delays[0], Duration::from_secs(5));
        assert_eq!(delays[1], Duration::from_secs_f64(7.5));
        assert_eq!(delays[2], Duration::from_secs_f64(11.25));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().expect("last"), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_degenerate_factor_is_constant() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 0.5, Duration::from_secs(10), 3);
        assert!(policy.delays().all(|d| d == Duration::from_secs(2)));
        assert_eq!(policy.total(), Duration::from_secs(6));
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert_eq!("Restricted".parse::<Visibility>(), Ok(Visibility::Restricted));
        assert!("secret".parse::<Visibility>().is_err());
        assert_eq!(Visibility::Restricted.as_str(), "restricted");
    }

    #[test]
    fn test_builder_overrides() {
        let config = SuiteConfig::for_workspace("/ws")
            .with_scope("@acme/")
            .with_package_manager("pnpm")
            .with_dry_run(true)
            .with_coverage_threshold(70.0);
        assert_eq!(config.workspace_root, PathBuf::from("/ws"));
        assert!(config.is_internal("@acme/logger"));
        assert!(!config.is_internal("@suite/logger"));
        assert_eq!(config.package_manager, "pnpm");
        assert!(config.dry_run);
        assert_eq!(config.coverage_threshold, 70.0);
        assert_eq!(config.max_resolution_rounds, 5);
    }
}
