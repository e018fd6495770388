//! The Plan Coordination Service loop.
//!
//! One `PlanCoordinator` per workspace. It owns its queue outright; signals
//! reach it only through an mpsc inbox, and the inbox is drained into the
//! queue between processing steps, so inserts never interleave with a pop.
//!
//! States:
//! - `Idle`: queue empty; run a bounded discovery scan, then wait for a
//!   signal, the idle interval, or shutdown.
//! - `Draining`: pop the head, generate its plan, write the result back.
//!
//! A failed generation is logged, marked `plan_failed` in the registry and
//! dropped. Discovery never picks a failed package up again; the requester's
//! own poll loop re-signals if it still needs the plan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use suite_registry::{PackageStatus, RegistryClient, RegistryUpdate};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::generator::{PlanGenerationRequest, PlanGenerator};
use crate::queue::{Enqueued, PlanQueue};
use crate::request::PlanRequest;
use crate::signal::{ChannelSignal, SPOOL_DIR};
use crate::CoordinatorResult;

/// Held exclusively by the one coordinator process serving a workspace.
pub const COORDINATOR_LOCK_FILE: &str = ".suite/plan-coordinator.lock";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workspace_root: PathBuf,
    /// Sleep between discovery scans while idle.
    pub idle_interval: Duration,
    /// Upper bound on records pulled per discovery scan.
    pub discovery_limit: usize,
    /// Cross-process request spool (see [`crate::SpoolSignal`]).
    pub spool_dir: PathBuf,
    /// Plans are written under `<plans_dir>/packages/<unscoped>.md`.
    pub plans_dir: PathBuf,
}

impl CoordinatorConfig {
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            spool_dir: root.join(SPOOL_DIR),
            plans_dir: root.join("plans"),
            workspace_root: root,
            idle_interval: Duration::from_secs(30),
            discovery_limit: 10,
        }
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_discovery_limit(mut self, limit: usize) -> Self {
        self.discovery_limit = limit;
        self
    }

    /// Singleton lock file for this workspace's coordinator.
    pub fn lock_path(&self) -> PathBuf {
        self.workspace_root.join(COORDINATOR_LOCK_FILE)
    }

    /// Where the plan for `package` should be written.
    pub fn plan_output_path(&self, package: &str) -> PathBuf {
        let unscoped = package.rsplit('/').next().unwrap_or(package);
        self.plans_dir
            .join("packages")
            .join(format!("{unscoped}.md"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Draining,
}

/// Per-instance counters.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    discovered: AtomicU64,
    signals: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub discovered: u64,
    pub signals: u64,
}

impl CoordinatorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            signals: self.signals.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct PlanCoordinator {
    config: CoordinatorConfig,
    registry: Arc<dyn RegistryClient>,
    generator: Arc<dyn PlanGenerator>,
    queue: PlanQueue,
    state: CoordinatorState,
    stats: Arc<CoordinatorStats>,
    inbox_tx: mpsc::UnboundedSender<PlanRequest>,
    inbox: mpsc::UnboundedReceiver<PlanRequest>,
}

impl PlanCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<dyn RegistryClient>,
        generator: Arc<dyn PlanGenerator>,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        Self {
            config,
            registry,
            generator,
            queue: PlanQueue::new(),
            state: CoordinatorState::Idle,
            stats: Arc::new(CoordinatorStats::default()),
            inbox_tx,
            inbox,
        }
    }

    /// Handle for sending requests into this coordinator from any task.
    pub fn signal(&self) -> ChannelSignal {
        ChannelSignal::new(self.inbox_tx.clone())
    }

    pub fn stats(&self) -> Arc<CoordinatorStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn queue(&self) -> &PlanQueue {
        &self.queue
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CoordinatorResult<()> {
        info!(
            workspace = %self.config.workspace_root.display(),
            idle_secs = self.config.idle_interval.as_secs(),
            "plan coordinator started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.drain_inbox();
            if let Some(request) = self.queue.pop() {
                self.state = CoordinatorState::Draining;
                self.process(request).await;
                continue;
            }

            if self.state != CoordinatorState::Idle {
                self.state = CoordinatorState::Idle;
                let s = self.stats.snapshot();
                info!(
                    processed = s.processed,
                    failed = s.failed,
                    skipped = s.skipped,
                    discovered = s.discovered,
                    signals = s.signals,
                    "plan coordinator idle"
                );
            }

            self.discover().await;
            if !self.queue.is_empty() {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(request) = self.inbox.recv() => self.enqueue(request),
                _ = tokio::time::sleep(self.config.idle_interval) => {}
            }
        }

        info!(stats = ?self.stats.snapshot(), "plan coordinator stopped");
        Ok(())
    }

    /// Move every pending signal into the queue.
    pub fn drain_inbox(&mut self) {
        while let Ok(request) = self.inbox.try_recv() {
            self.enqueue(request);
        }
    }

    fn enqueue(&mut self, request: PlanRequest) {
        CoordinatorStats::bump(&self.stats.signals);
        let package = request.package.clone();
        let priority = request.priority;
        match self.queue.push(request) {
            Enqueued::Duplicate => debug!(package = %package, "plan request already queued"),
            outcome => info!(
                package = %package,
                priority = ?priority,
                outcome = ?outcome,
                depth = self.queue.len(),
                "plan request queued"
            ),
        }
    }

    /// Bounded scan for packages that still need a plan; appended low.
    pub async fn discover(&mut self) {
        let matches = match self
            .registry
            .query_by_status(PackageStatus::NeedsPlan, self.config.discovery_limit)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "discovery scan failed");
                return;
            }
        };

        for m in matches {
            if m.plan_path.as_deref().is_some_and(|p| !p.trim().is_empty()) {
                continue;
            }
            if self.queue.push(PlanRequest::discovered(&m.name)) == Enqueued::Inserted {
                CoordinatorStats::bump(&self.stats.discovered);
                debug!(package = %m.name, "discovered package needing a plan");
            }
        }
    }

    /// Generate one plan and record it.
    pub async fn process(&mut self, request: PlanRequest) {
        let package = request.package.as_str();

        let record = match self.registry.get(package).await {
            Ok(r) => r,
            Err(e) => {
                warn!(package = %package, error = %e, "registry lookup failed; proceeding without record");
                None
            }
        };
        if record.as_ref().is_some_and(|r| r.has_plan()) {
            CoordinatorStats::bump(&self.stats.skipped);
            debug!(package = %package, "package already has a plan");
            return;
        }
        let dependencies = record.map(|r| r.dependencies).unwrap_or_default();

        if let Err(e) = self
            .registry
            .update(package, &RegistryUpdate::status(PackageStatus::Planning))
            .await
        {
            warn!(package = %package, error = %e, "could not mark package planning");
        }

        let generation = PlanGenerationRequest {
            package: package.to_string(),
            dependencies,
            output_path: self.config.plan_output_path(package),
        };
        info!(
            package = %package,
            requested_by = %request.requested_by,
            source = %request.source,
            "generating plan"
        );

        match self.generator.generate(&generation).await {
            Ok(artifact) => {
                let update = RegistryUpdate::plan_ready(&artifact.plan_path, &artifact.branch_ref);
                match self.registry.update(package, &update).await {
                    Ok(()) => {
                        CoordinatorStats::bump(&self.stats.processed);
                        info!(
                            package = %package,
                            plan_path = %artifact.plan_path,
                            branch_ref = %artifact.branch_ref,
                            "plan recorded"
                        );
                    }
                    Err(e) => {
                        CoordinatorStats::bump(&self.stats.failed);
                        warn!(package = %package, error = %e, "plan written but registry update failed");
                    }
                }
            }
            Err(e) => {
                CoordinatorStats::bump(&self.stats.failed);
                warn!(package = %package, error = %e, "plan generation failed; request dropped");
                // Leaving it `needs_plan` would have discovery retry it forever.
                if let Err(e) = self
                    .registry
                    .update(package, &RegistryUpdate::status(PackageStatus::PlanFailed))
                    .await
                {
                    warn!(package = %package, error = %e, "could not mark plan failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_output_path_uses_unscoped_name() {
        let config = CoordinatorConfig::for_workspace("/ws");
        assert_eq!(
            config.plan_output_path("@suite/cache"),
            PathBuf::from("/ws/plans/packages/cache.md")
        );
        assert_eq!(
            config.plan_output_path("plain"),
            PathBuf::from("/ws/plans/packages/plain.md")
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::for_workspace("/ws")
            .with_idle_interval(Duration::from_secs(5))
            .with_discovery_limit(3);
        assert_eq!(config.spool_dir, PathBuf::from("/ws/.suite/plan-requests"));
        assert_eq!(config.idle_interval, Duration::from_secs(5));
        assert_eq!(config.discovery_limit, 3);
    }
}
