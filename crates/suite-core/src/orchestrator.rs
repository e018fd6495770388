//! Suite Build Orchestrator.
//!
//! One run takes a target package through two phases:
//!
//! 1. **Acquire**: build the dependency tree; for every package that is not
//!    local yet, either implement it from its plan or signal the plan
//!    coordinator and poll for a plan, then re-resolve. Repeats until the
//!    tree is complete or no round makes progress.
//! 2. **Execute**: walk the tree in dependency order. Each package is built,
//!    tested, scored and, if the gate allows, published under the workspace
//!    lock, after which its dependents are pointed at the new version.
//!
//! Every package ends with exactly one [`PackageOutcomeStatus`] in the
//! report; one package failing never stops its unrelated siblings.

use std::collections::HashSet;
use std::sync::Arc;

use plan_coordinator::{PlanRequest, PlanSignal};
use serde::{Deserialize, Serialize};
use suite_registry::RegistryClient;
use suite_toolchain::Toolchain;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advisor::{NoopSplitAdvisor, SplitAdvisor};
use crate::compliance::ComplianceGate;
use crate::config::{SuiteConfig, Visibility};
use crate::domain::{PackageNode, Result, StepStatus, SuiteError};
use crate::executor::BuildExecutor;
use crate::implement::{ImplementationGenerator, ImplementationRequest};
use crate::lock::WorkspaceLock;
use crate::metrics::METRICS;
use crate::obs;
use crate::plan_wait::{PlanPoller, PollOutcome};
use crate::publish::{ChangeType, PublishCoordinator, PublishTransport, Semver, VersionChange};
use crate::report::{write_suite_report, PackageOutcomeStatus, PackageReport, SuiteReport};
use crate::resolver::{DependencyResolver, DependencyTree, Resolution, Unresolved};

/// Per-run overrides of the configured publish behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Bump applied when a package's manifest version is already published.
    pub bump: Option<ChangeType>,
    pub visibility: Option<Visibility>,
    pub dry_run: Option<bool>,
}

impl RunOptions {
    pub fn with_bump(mut self, bump: ChangeType) -> Self {
        self.bump = Some(bump);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }
}

/// Result of trying to make one missing package local.
enum Acquired {
    /// Something changed on disk; the next round should re-resolve.
    Progress,
    /// Terminal for this run.
    GaveUp(PackageReport),
}

pub struct SuiteOrchestrator {
    config: Arc<SuiteConfig>,
    resolver: DependencyResolver,
    executor: BuildExecutor,
    gate: ComplianceGate,
    publisher: PublishCoordinator,
    poller: PlanPoller,
    signal: Arc<dyn PlanSignal>,
    implementer: Arc<dyn ImplementationGenerator>,
    advisor: Arc<dyn SplitAdvisor>,
}

impl SuiteOrchestrator {
    pub fn new(
        config: Arc<SuiteConfig>,
        registry: Arc<dyn RegistryClient>,
        toolchain: Arc<dyn Toolchain>,
        signal: Arc<dyn PlanSignal>,
        transport: Arc<dyn PublishTransport>,
        implementer: Arc<dyn ImplementationGenerator>,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(config.clone(), registry.clone()),
            executor: BuildExecutor::new(config.clone(), toolchain.clone()),
            gate: ComplianceGate::new(config.clone(), toolchain),
            publisher: PublishCoordinator::new(config.clone(), registry.clone(), transport),
            poller: PlanPoller::new(registry, config.plan_backoff.clone())
                .with_signal(signal.clone()),
            signal,
            implementer,
            advisor: Arc::new(NoopSplitAdvisor),
            config,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SplitAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Build, verify and publish `target` and everything it depends on.
    ///
    /// Per-package failures are recorded in the report; `Err` is only
    /// returned for I/O or usage errors that make the run meaningless.
    pub async fn run(&self, target: &str, options: &RunOptions) -> Result<SuiteReport> {
        let run_id = Uuid::new_v4().to_string();
        let _span = obs::SuiteSpan::enter(&run_id, target);
        obs::emit_suite_started(&run_id, target);

        let mut report = SuiteReport::new(&run_id, target);
        if let Some(tree) = self.acquire(target, &run_id, &mut report).await? {
            self.execute(tree, options, &mut report).await?;
        }
        report.finish();

        if let Some(dir) = &self.config.report_dir {
            if let Err(e) = write_suite_report(&report, dir) {
                obs::emit_report_write_error(&run_id, &e);
            }
        }
        METRICS.flush();
        obs::emit_suite_finished(
            &run_id,
            report.duration_ms().unwrap_or_default(),
            report.packages.len(),
            report.count(PackageOutcomeStatus::Published),
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Acquire
    // -----------------------------------------------------------------------

    /// Resolve the tree, filling in missing packages. `None` when the root
    /// itself could not be resolved (already recorded).
    async fn acquire(
        &self,
        target: &str,
        run_id: &str,
        report: &mut SuiteReport,
    ) -> Result<Option<DependencyTree>> {
        let mut given_up: HashSet<String> = HashSet::new();
        let mut implemented: HashSet<String> = HashSet::new();
        let rounds = self.config.max_resolution_rounds.max(1);

        for round in 1..=rounds {
            let tree = match self.resolver.build_dependency_tree(target).await {
                Ok(tree) => tree,
                Err(SuiteError::Resolve(e)) => {
                    warn!(package = %target, error = %e, "dependency resolution failed");
                    report.record(
                        PackageReport::new(target, PackageOutcomeStatus::ResolutionFailed)
                            .with_detail(e.to_string()),
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            if tree.is_complete() {
                debug!(round, packages = tree.order.len(), "dependency tree complete");
                return Ok(Some(tree));
            }

            let mut progressed = false;
            for missing in &tree.unresolved {
                if given_up.contains(&missing.name) {
                    continue;
                }
                match self.acquire_package(missing, run_id, &mut implemented).await? {
                    Acquired::Progress => progressed = true,
                    Acquired::GaveUp(package_report) => {
                        given_up.insert(missing.name.clone());
                        report.record(package_report);
                    }
                }
            }

            if !progressed || round == rounds {
                for missing in &tree.unresolved {
                    if report.package(&missing.name).is_none() {
                        report.record(
                            PackageReport::new(&missing.name, PackageOutcomeStatus::ResolutionFailed)
                                .with_detail(format!("still unresolved after {round} rounds")),
                        );
                    }
                }
                return Ok(if tree.order.is_empty() { None } else { Some(tree) });
            }
        }
        Ok(None)
    }

    async fn acquire_package(
        &self,
        missing: &Unresolved,
        run_id: &str,
        implemented: &mut HashSet<String>,
    ) -> Result<Acquired> {
        let name = missing.name.as_str();
        match &missing.resolution {
            Resolution::Local(_) => Ok(Acquired::Progress),
            Resolution::Planned { plan, package_dir } => {
                self.implement(name, &plan.path, package_dir, implemented).await
            }
            Resolution::Unplanned { .. } => {
                self.signal_plan(name, run_id).await;
                match self.poller.wait_for_plan(name, run_id).await {
                    PollOutcome::Found { plan_path, attempts, .. } => {
                        info!(package = %name, plan_path = %plan_path, attempts, "plan available");
                        match self.resolver.resolve(name).await? {
                            Resolution::Local(_) => Ok(Acquired::Progress),
                            Resolution::Planned { plan, package_dir } => {
                                self.implement(name, &plan.path, &package_dir, implemented).await
                            }
                            Resolution::Unplanned { .. } => Ok(Acquired::GaveUp(
                                PackageReport::new(name, PackageOutcomeStatus::AwaitingPlan)
                                    .with_detail(format!(
                                        "registry lists plan {plan_path} but it could not be resolved"
                                    )),
                            )),
                        }
                    }
                    PollOutcome::Exhausted {
                        attempts,
                        diagnosis,
                        message,
                    } => {
                        obs::emit_plan_poll_exhausted(name, attempts, diagnosis.as_str());
                        let mut package_report =
                            PackageReport::new(name, PackageOutcomeStatus::AwaitingPlan)
                                .with_detail(message);
                        package_report.wait_diagnosis = Some(diagnosis);
                        Ok(Acquired::GaveUp(package_report))
                    }
                }
            }
        }
    }

    async fn implement(
        &self,
        name: &str,
        plan_path: &std::path::Path,
        package_dir: &std::path::Path,
        implemented: &mut HashSet<String>,
    ) -> Result<Acquired> {
        if !implemented.insert(name.to_string()) {
            return Ok(Acquired::GaveUp(
                PackageReport::new(name, PackageOutcomeStatus::ResolutionFailed).with_detail(format!(
                    "implementation in {} did not produce a package named {name}",
                    package_dir.display()
                )),
            ));
        }
        let request = ImplementationRequest {
            package: name.to_string(),
            plan_path: plan_path.to_path_buf(),
            package_dir: package_dir.to_path_buf(),
        };
        info!(package = %name, dir = %package_dir.display(), "implementing package from plan");
        match self.implementer.implement(&request).await {
            Ok(()) => Ok(Acquired::Progress),
            Err(e) => {
                warn!(package = %name, error = %e, "implementation failed");
                Ok(Acquired::GaveUp(
                    PackageReport::new(name, PackageOutcomeStatus::FailedBuild)
                        .with_detail(e.to_string()),
                ))
            }
        }
    }

    /// Best-effort: a failed signal is logged and the poll loop still runs.
    async fn signal_plan(&self, name: &str, run_id: &str) {
        METRICS.inc_plan_signals();
        let request = PlanRequest::from_build(name, run_id);
        match self.signal.send(request).await {
            Ok(()) => obs::emit_plan_signaled(name, true),
            Err(e) => {
                warn!(package = %name, error = %e, "plan signal not delivered; polling anyway");
                obs::emit_plan_signaled(name, false);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execute
    // -----------------------------------------------------------------------

    async fn execute(
        &self,
        tree: DependencyTree,
        options: &RunOptions,
        report: &mut SuiteReport,
    ) -> Result<()> {
        let DependencyTree { order, unresolved } = tree;
        let unresolved: HashSet<&str> = unresolved.iter().map(|u| u.name.as_str()).collect();

        for node in order {
            let blocker = node.dependencies.iter().find(|dep| {
                match report.status_of(dep) {
                    Some(status) => !status.is_success(),
                    None => unresolved.contains(dep.as_str()),
                }
            });
            if let Some(dep) = blocker {
                info!(package = %node.name, dependency = %dep, "skipping; dependency not published");
                report.record(
                    PackageReport::new(&node.name, PackageOutcomeStatus::Skipped)
                        .with_detail(format!("dependency {dep} was not published"))
                        .with_node(node),
                );
                continue;
            }
            let package_report = self.process(node, options).await?;
            report.record(package_report);
        }
        Ok(())
    }

    /// Build, verify and publish one package whose dependencies are done.
    pub async fn process(&self, mut node: PackageNode, options: &RunOptions) -> Result<PackageReport> {
        node.build_status = StepStatus::Running;
        let build = self.executor.build(&node).await;
        node.build_status = StepStatus::from_passed(build.success);
        METRICS.inc_built();
        obs::emit_package_built(&node.name, build.success, build.duration_ms);
        if !build.success {
            let detail = if build.timed_out {
                "build timed out".to_string()
            } else {
                format!("build failed:\n{}", tail(&build.output, 20))
            };
            return Ok(PackageReport::new(&node.name, PackageOutcomeStatus::FailedBuild)
                .with_detail(detail)
                .with_node(node));
        }

        node.test_status = StepStatus::Running;
        let tests = self.executor.test(&node).await;
        node.test_status = StepStatus::from_passed(tests.success);

        let compliance = self.gate.evaluate(&node, &self.executor, Some(&tests)).await;
        obs::emit_gate_evaluated(&node.name, compliance.score.total, compliance.level().as_str());
        if !compliance.is_publishable() {
            METRICS.inc_blocked();
            let split_suggestion = self.advisor.advise(&node, &compliance).await;
            let mut package_report =
                PackageReport::new(&node.name, PackageOutcomeStatus::BlockedByQuality)
                    .with_detail(format!(
                        "compliance score {} is below the publish threshold",
                        compliance.score.total
                    ));
            package_report.compliance = Some(compliance);
            package_report.split_suggestion = split_suggestion;
            package_report.node = Some(node);
            return Ok(package_report);
        }

        let mut package_report = self.publish(&mut node, options).await?;
        package_report.compliance = Some(compliance);
        package_report.node = Some(node);
        Ok(package_report)
    }

    /// Version to publish: the manifest's, bumped only when that one is
    /// already out and a bump was asked for.
    async fn target_version(&self, node: &PackageNode, options: &RunOptions) -> Result<String> {
        let current = Semver::parse(&node.version)?;
        match options.bump {
            Some(bump) if self.publisher.is_already_published(&node.name, &node.version).await => {
                Ok(current.bump(bump).to_string())
            }
            _ => Ok(node.version.clone()),
        }
    }

    async fn publish(&self, node: &mut PackageNode, options: &RunOptions) -> Result<PackageReport> {
        let name = node.name.clone();
        let dry_run = options.dry_run.unwrap_or(self.config.dry_run);
        let visibility = options.visibility.unwrap_or(self.config.visibility);

        let version = match self.target_version(node, options).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(PackageReport::new(&name, PackageOutcomeStatus::PublishFailed)
                    .with_detail(e.to_string()))
            }
        };

        let _lock = match WorkspaceLock::acquire(
            &self.config.workspace_root,
            &format!("publish {name}@{version}"),
            &self.config.lock_backoff,
        )
        .await
        {
            Ok(lock) => lock,
            Err(e) => {
                return Ok(PackageReport::new(&name, PackageOutcomeStatus::PublishFailed)
                    .with_detail(e.to_string()))
            }
        };

        let outcome = match self
            .publisher
            .publish(&node.path, &version, visibility, dry_run)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(PackageReport::new(&name, PackageOutcomeStatus::PublishFailed)
                    .with_detail(e.to_string()))
            }
        };
        if !outcome.success {
            let detail = outcome
                .error
                .clone()
                .unwrap_or_else(|| "publish rejected".to_string());
            let mut package_report =
                PackageReport::new(&name, PackageOutcomeStatus::PublishFailed).with_detail(detail);
            package_report.publish = Some(outcome);
            return Ok(package_report);
        }

        let mut package_report = PackageReport::new(&name, PackageOutcomeStatus::Published);
        if dry_run {
            package_report.detail = Some("dry run; dependents not updated".to_string());
        } else {
            let updates = match self.publisher.propagate(&name, &version) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(package = %name, error = %e, "dependent propagation failed");
                    package_report.detail = Some(format!("dependents not updated: {e}"));
                    Vec::new()
                }
            };
            let change = VersionChange::new(&name, &node.version, &version, updates)?;
            obs::emit_package_published(&name, &version, change.dependents_updated.len());
            package_report.version_change = Some(change);
            node.version = version;
        }
        METRICS.inc_published();
        package_report.publish = Some(outcome);
        Ok(package_report)
    }
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
