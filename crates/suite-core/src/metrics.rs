//! Process-wide counters for suite runs.
//!
//! Incremented at the call site; [`Metrics::flush`] logs them all as one
//! event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    packages_built: AtomicU64,
    packages_blocked: AtomicU64,
    packages_published: AtomicU64,
    plan_signals: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            packages_built: AtomicU64::new(0),
            packages_blocked: AtomicU64::new(0),
            packages_published: AtomicU64::new(0),
            plan_signals: AtomicU64::new(0),
        }
    }

    pub fn inc_built(&self) {
        self.packages_built.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "packages_built", "counter incremented");
    }

    pub fn inc_blocked(&self) {
        self.packages_blocked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "packages_blocked", "counter incremented");
    }

    pub fn inc_published(&self) {
        self.packages_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "packages_published", "counter incremented");
    }

    pub fn inc_plan_signals(&self) {
        self.plan_signals.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "plan_signals", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            packages_built = self.packages_built(),
            packages_blocked = self.packages_blocked(),
            packages_published = self.packages_published(),
            plan_signals = self.plan_signals(),
        );
    }

    pub fn packages_built(&self) -> u64 {
        self.packages_built.load(Ordering::Relaxed)
    }

    pub fn packages_blocked(&self) -> u64 {
        self.packages_blocked.load(Ordering::Relaxed)
    }

    pub fn packages_published(&self) -> u64 {
        self.packages_published.load(Ordering::Relaxed)
    }

    pub fn plan_signals(&self) -> u64 {
        self.plan_signals.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.packages_built.store(0, Ordering::Relaxed);
        self.packages_blocked.store(0, Ordering::Relaxed);
        self.packages_published.store(0, Ordering::Relaxed);
        self.plan_signals.store(0, Ordering::Relaxed);
    }
}
