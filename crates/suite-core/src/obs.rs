//! Structured lifecycle events for suite runs.
//!
//! Every event is an `info!` (or `warn!`) line with an `event` field so log
//! pipelines can filter on it. [`SuiteSpan`] tags everything emitted during
//! a run with its `run_id`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped span.
pub struct SuiteSpan {
    _span: tracing::span::EnteredSpan,
}

impl SuiteSpan {
    pub fn enter(run_id: &str, target: &str) -> Self {
        let span = tracing::info_span!("suite.run", run_id = %run_id, target = %target);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_suite_started(run_id: &str, target: &str) {
    info!(event = "suite.started", run_id = %run_id, target = %target);
}

pub fn emit_suite_finished(run_id: &str, duration_ms: u64, packages: usize, published: usize) {
    info!(
        event = "suite.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        packages = packages,
        published = published,
    );
}

pub fn emit_package_built(package: &str, success: bool, duration_ms: u64) {
    info!(
        event = "package.built",
        package = %package,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_gate_evaluated(package: &str, score: f64, level: &str) {
    info!(event = "gate.evaluated", package = %package, score = score, level = %level);
}

pub fn emit_package_published(package: &str, version: &str, dependents: usize) {
    info!(
        event = "package.published",
        package = %package,
        version = %version,
        dependents = dependents,
    );
}

/// A plan request was sent; `delivered` is false when the signal failed.
pub fn emit_plan_signaled(package: &str, delivered: bool) {
    info!(event = "plan.signaled", package = %package, delivered = delivered);
}

pub fn emit_plan_poll_exhausted(package: &str, attempts: u32, diagnosis: &str) {
    warn!(
        event = "plan.poll_exhausted",
        package = %package,
        attempts = attempts,
        diagnosis = %diagnosis,
    );
}

pub fn emit_report_write_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "suite.report_error", run_id = %run_id, error = %error);
}
