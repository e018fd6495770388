//! Tracing setup shared by the `suite` and `plan-coordinatord` binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level; everything else is `warn`.
const SUITE_TARGETS: [&str; 6] = [
    "suite_core",
    "suite_registry",
    "suite_toolchain",
    "plan_coordinator",
    "plan_coordinatord",
    "suite",
];

fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        SUITE_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_ascii_lowercase())),
    );
    directives.join(",")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `json`, every line is a JSON
/// object on stdout; otherwise human-readable lines go to stderr so command
/// output stays pipeable. Only the first call in a process has any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
