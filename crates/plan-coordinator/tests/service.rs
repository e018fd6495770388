//! Plan coordinator loop behaviour against an in-memory registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use plan_coordinator::{
    CoordinatorConfig, CoordinatorError, CoordinatorResult, PlanArtifact, PlanCoordinator,
    PlanGenerationRequest, PlanGenerator, PlanRequest, PlanSignal, SpoolSignal,
};
use suite_registry::fakes::MemoryRegistry;
use suite_registry::{PackageStatus, RegistryRecord};
use tokio::sync::{mpsc, watch, Notify};

/// Records call order; the first call parks until released.
struct GatedGenerator {
    calls: Mutex<Vec<String>>,
    started: mpsc::UnboundedSender<String>,
    gate: Notify,
    hold_first: bool,
    fail: Vec<String>,
}

impl GatedGenerator {
    fn new(hold_first: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let generator = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            started,
            gate: Notify::new(),
            hold_first,
            fail: Vec::new(),
        });
        (generator, rx)
    }

    fn failing(names: &[&str]) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let generator = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            started,
            gate: Notify::new(),
            hold_first: false,
            fail: names.iter().map(|s| s.to_string()).collect(),
        });
        (generator, rx)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PlanGenerator for GatedGenerator {
    async fn generate(&self, request: &PlanGenerationRequest) -> CoordinatorResult<PlanArtifact> {
        let first = {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(request.package.clone());
            calls.len() == 1
        };
        let _ = self.started.send(request.package.clone());
        if first && self.hold_first {
            self.gate.notified().await;
        }
        if self.fail.contains(&request.package) {
            return Err(CoordinatorError::Generation {
                package: request.package.clone(),
                message: "collaborator error".to_string(),
            });
        }
        Ok(PlanArtifact {
            plan_path: request.output_path.display().to_string(),
            branch_ref: format!("plan/{}", request.package),
        })
    }
}

fn needs_plan(name: &str) -> RegistryRecord {
    RegistryRecord::new(name).with_status(PackageStatus::NeedsPlan)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("generator call within deadline")
        .expect("generator channel open")
}

/// Test: a high signal arriving while only low entries are queued is processed first
#[tokio::test(start_paused = true)]
async fn test_high_signal_preempts_queued_low_entries() {
    let registry = Arc::new(MemoryRegistry::with_records([
        needs_plan("@suite/l1"),
        needs_plan("@suite/l2"),
        needs_plan("@suite/l3"),
    ]));
    let (generator, mut started) = GatedGenerator::new(true);
    let coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws").with_idle_interval(Duration::from_secs(5)),
        registry.clone(),
        generator.clone(),
    );
    let signal = coordinator.signal();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(coordinator.run(shutdown_rx));

    // Discovery queued l1..l3 low; l1 is in flight and parked.
    assert_eq!(next(&mut started).await, "@suite/l1");
    signal
        .send(PlanRequest::from_build("@suite/hot", "run-7"))
        .await
        .expect("signal");
    generator.gate.notify_one();

    assert_eq!(next(&mut started).await, "@suite/hot");
    assert_eq!(next(&mut started).await, "@suite/l2");
    assert_eq!(next(&mut started).await, "@suite/l3");

    shutdown_tx.send(true).expect("shutdown");
    handle.await.expect("join").expect("run");

    assert_eq!(
        generator.calls(),
        vec!["@suite/l1", "@suite/hot", "@suite/l2", "@suite/l3"]
    );
    let hot = registry.snapshot("@suite/hot").expect("hot record");
    assert_eq!(hot.status, PackageStatus::Planned);
    assert_eq!(hot.branch_ref.as_deref(), Some("plan/@suite/hot"));
    assert_eq!(
        hot.plan_path.as_deref(),
        Some("/ws/plans/packages/hot.md")
    );
}

/// Test: a failed generation is dropped, not retried by the service
#[tokio::test(start_paused = true)]
async fn test_failed_generation_is_not_requeued() {
    let registry = Arc::new(MemoryRegistry::new());
    let (generator, mut started) = GatedGenerator::failing(&["@suite/bad"]);
    let coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws").with_idle_interval(Duration::from_secs(5)),
        registry.clone(),
        generator.clone(),
    );
    let signal = coordinator.signal();
    let stats = coordinator.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(coordinator.run(shutdown_rx));

    signal
        .send(PlanRequest::from_build("@suite/bad", "run-1"))
        .await
        .expect("signal");
    assert_eq!(next(&mut started).await, "@suite/bad");
    signal
        .send(PlanRequest::from_build("@suite/good", "run-1"))
        .await
        .expect("signal");
    assert_eq!(next(&mut started).await, "@suite/good");

    // Several idle ticks; nothing else may reach the generator.
    tokio::time::sleep(Duration::from_secs(30)).await;
    shutdown_tx.send(true).expect("shutdown");
    handle.await.expect("join").expect("run");

    assert_eq!(generator.calls(), vec!["@suite/bad", "@suite/good"]);
    let s = stats.snapshot();
    assert_eq!(s.failed, 1);
    assert_eq!(s.processed, 1);
    let bad = registry.snapshot("@suite/bad").expect("record");
    assert!(!bad.has_plan());
    assert_eq!(bad.status, PackageStatus::PlanFailed);
}

/// Test: a discovered package whose generation fails is not rediscovered on later idle ticks
#[tokio::test(start_paused = true)]
async fn test_failed_discovered_package_is_not_rediscovered() {
    let registry = Arc::new(MemoryRegistry::with_records([needs_plan("@suite/bad")]));
    let (generator, mut started) = GatedGenerator::failing(&["@suite/bad"]);
    let coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws").with_idle_interval(Duration::from_secs(5)),
        registry.clone(),
        generator.clone(),
    );
    let stats = coordinator.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(coordinator.run(shutdown_rx));

    assert_eq!(next(&mut started).await, "@suite/bad");
    // Ten idle intervals pass without another attempt.
    tokio::time::sleep(Duration::from_secs(50)).await;
    shutdown_tx.send(true).expect("shutdown");
    handle.await.expect("join").expect("run");

    assert_eq!(generator.calls(), vec!["@suite/bad"]);
    assert_eq!(stats.snapshot().failed, 1);
    let bad = registry.snapshot("@suite/bad").expect("record");
    assert_eq!(bad.status, PackageStatus::PlanFailed);
    let statuses: Vec<_> = registry
        .updates()
        .into_iter()
        .filter_map(|(_, u)| u.status)
        .collect();
    assert_eq!(
        statuses,
        vec![PackageStatus::Planning, PackageStatus::PlanFailed]
    );
}

/// Test: an explicit request retries a package whose last generation failed
#[tokio::test(start_paused = true)]
async fn test_explicit_request_retries_failed_package() {
    let registry = Arc::new(MemoryRegistry::with_records([
        RegistryRecord::new("@suite/flaky").with_status(PackageStatus::PlanFailed)
    ]));
    let (generator, _started) = GatedGenerator::new(false);
    let mut coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws"),
        registry.clone(),
        generator.clone(),
    );

    coordinator.discover().await;
    assert!(coordinator.queue().is_empty());

    coordinator
        .process(PlanRequest::from_build("@suite/flaky", "run-2"))
        .await;
    assert_eq!(generator.calls(), vec!["@suite/flaky"]);
    let flaky = registry.snapshot("@suite/flaky").expect("record");
    assert_eq!(flaky.status, PackageStatus::Planned);
}

/// Test: records that already carry a plan are skipped
#[tokio::test(start_paused = true)]
async fn test_already_planned_package_is_skipped() {
    let registry = Arc::new(MemoryRegistry::with_records([RegistryRecord::new("@suite/done")
        .with_plan("plans/packages/done.md", "plan/done")]));
    let (generator, _started) = GatedGenerator::new(false);
    let mut coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws"),
        registry.clone(),
        generator.clone(),
    );

    coordinator
        .process(PlanRequest::from_build("@suite/done", "run-1"))
        .await;

    assert!(generator.calls().is_empty());
    assert_eq!(coordinator.stats().snapshot().skipped, 1);
    assert!(registry.updates().is_empty());
}

/// Test: the coordinator marks a package planning before generating
#[tokio::test(start_paused = true)]
async fn test_process_marks_planning_then_planned() {
    let registry = Arc::new(MemoryRegistry::with_records([
        needs_plan("@suite/cache").with_dependencies(vec!["@suite/logger".to_string()])
    ]));
    let (generator, _started) = GatedGenerator::new(false);
    let mut coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws"),
        registry.clone(),
        generator,
    );

    coordinator
        .process(PlanRequest::from_build("@suite/cache", "run-1"))
        .await;

    let statuses: Vec<_> = registry
        .updates()
        .into_iter()
        .filter_map(|(_, u)| u.status)
        .collect();
    assert_eq!(statuses, vec![PackageStatus::Planning, PackageStatus::Planned]);
}

/// Test: discovery ignores matches that already reference a plan and is bounded
#[tokio::test]
async fn test_discovery_respects_limit() {
    let registry = Arc::new(MemoryRegistry::with_records([
        needs_plan("@suite/a"),
        needs_plan("@suite/b"),
        needs_plan("@suite/c"),
        RegistryRecord::new("@suite/published").with_status(PackageStatus::Published),
    ]));
    let (generator, _started) = GatedGenerator::new(false);
    let mut coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace("/ws").with_discovery_limit(2),
        registry,
        generator,
    );

    coordinator.discover().await;
    assert_eq!(coordinator.queue().packages(), vec!["@suite/a", "@suite/b"]);
    assert_eq!(coordinator.queue().high_len(), 0);

    // A second scan does not duplicate entries.
    coordinator.discover().await;
    assert_eq!(coordinator.queue().len(), 2);
}

/// Test: spooled requests from another process reach the queue as high priority
#[tokio::test]
async fn test_spooled_request_promotes_discovered_entry() {
    let ws = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(MemoryRegistry::with_records([
        needs_plan("@suite/a"),
        needs_plan("@suite/b"),
    ]));
    let (generator, _started) = GatedGenerator::new(false);
    let mut coordinator = PlanCoordinator::new(
        CoordinatorConfig::for_workspace(ws.path()),
        registry,
        generator,
    );
    coordinator.discover().await;

    let spool = SpoolSignal::for_workspace(ws.path());
    spool
        .send(PlanRequest::from_build("@suite/b", "run-9"))
        .await
        .expect("spool");
    let signal = coordinator.signal();
    for request in plan_coordinator::drain_spool(spool.dir()).await.expect("drain") {
        signal.send(request).await.expect("forward");
    }
    coordinator.drain_inbox();

    assert_eq!(coordinator.queue().packages(), vec!["@suite/b", "@suite/a"]);
    assert_eq!(coordinator.queue().high_len(), 1);
}
