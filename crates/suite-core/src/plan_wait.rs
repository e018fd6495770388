//! Build-side wait for a package's implementation plan.
//!
//! After a plan request has been signalled, the orchestrator polls the
//! registry for a plan reference on a geometric schedule with a hard attempt
//! ceiling. Exhaustion is an outcome, not an error, and carries a diagnosis
//! so the report can say whether the coordinator looked absent or just slow.
//!
//! The coordinator never retries a failed generation on its own. When a poll
//! sees `plan_failed` the poller re-sends the request, so a transient
//! generator failure is retried for as long as the build still waits.

use std::sync::Arc;

use plan_coordinator::{PlanRequest, PlanSignal};
use serde::{Deserialize, Serialize};
use suite_registry::{PackageStatus, RegistryClient};
use tracing::{debug, info, warn};

use crate::config::BackoffPolicy;

/// Why a poll loop ended without a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitDiagnosis {
    /// The record never left its initial state: nobody picked the request up.
    ServiceLikelyDown,
    /// The coordinator marked the package `planning` but did not finish.
    SlowInProgress,
    /// Every poll failed to reach the registry.
    RegistryUnreachable,
    /// The coordinator ran the generator and it failed.
    GenerationFailed,
}

impl WaitDiagnosis {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitDiagnosis::ServiceLikelyDown => "service_likely_down",
            WaitDiagnosis::SlowInProgress => "slow_in_progress",
            WaitDiagnosis::RegistryUnreachable => "registry_unreachable",
            WaitDiagnosis::GenerationFailed => "generation_failed",
        }
    }

    /// Operator-facing next step.
    pub fn advice(&self, package: &str) -> String {
        match self {
            WaitDiagnosis::ServiceLikelyDown => format!(
                "no plan for {package} and no coordinator picked it up; \
                 start plan-coordinatord for this workspace and rerun the build"
            ),
            WaitDiagnosis::SlowInProgress => format!(
                "plan generation for {package} is in progress but slow; \
                 rerun the build later or raise the poll budget"
            ),
            WaitDiagnosis::RegistryUnreachable => format!(
                "registry unreachable while waiting for a plan for {package}; \
                 check SUITE_REGISTRY_URL and credentials"
            ),
            WaitDiagnosis::GenerationFailed => format!(
                "plan generation for {package} failed; \
                 check the plan-coordinatord log and rerun the build"
            ),
        }
    }
}

impl std::fmt::Display for WaitDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollOutcome {
    Found {
        plan_path: String,
        branch_ref: Option<String>,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        diagnosis: WaitDiagnosis,
        message: String,
    },
}

impl PollOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PollOutcome::Found { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Found { attempts, .. } | PollOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct PlanPoller {
    registry: Arc<dyn RegistryClient>,
    policy: BackoffPolicy,
    signal: Option<Arc<dyn PlanSignal>>,
}

impl PlanPoller {
    pub fn new(registry: Arc<dyn RegistryClient>, policy: BackoffPolicy) -> Self {
        Self {
            registry,
            policy,
            signal: None,
        }
    }

    /// Re-send requests through `signal` when a generation is seen to fail.
    pub fn with_signal(mut self, signal: Arc<dyn PlanSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Poll until `name` carries a plan reference or the attempt ceiling is hit.
    ///
    /// Makes at most `max_attempts` registry calls and sleeps only between
    /// them, so the total wait is bounded by [`BackoffPolicy::total`].
    pub async fn wait_for_plan(&self, name: &str, requested_by: &str) -> PollOutcome {
        let mut reached = false;
        let mut last_status: Option<PackageStatus> = None;
        let mut attempts = 0;

        for attempt in 0..self.policy.max_attempts {
            attempts = attempt + 1;
            match self.registry.get(name).await {
                Ok(Some(record)) => {
                    reached = true;
                    if let Some(plan_path) = record.plan_path.clone().filter(|p| !p.is_empty()) {
                        debug!(package = %name, attempts, plan_path = %plan_path, "plan found");
                        return PollOutcome::Found {
                            plan_path,
                            branch_ref: record.branch_ref,
                            attempts,
                        };
                    }
                    last_status = Some(record.status);
                }
                Ok(None) => reached = true,
                Err(e) => debug!(package = %name, attempt = attempts, error = %e, "plan poll failed"),
            }

            if attempts < self.policy.max_attempts {
                if last_status == Some(PackageStatus::PlanFailed) {
                    self.resignal(name, requested_by).await;
                }
                let delay = self.policy.delay(attempt);
                debug!(package = %name, attempt = attempts, delay_ms = delay.as_millis() as u64, "no plan yet");
                tokio::time::sleep(delay).await;
            }
        }

        let diagnosis = if !reached {
            WaitDiagnosis::RegistryUnreachable
        } else if last_status == Some(PackageStatus::PlanFailed) {
            WaitDiagnosis::GenerationFailed
        } else if last_status == Some(PackageStatus::Planning) {
            WaitDiagnosis::SlowInProgress
        } else {
            WaitDiagnosis::ServiceLikelyDown
        };
        let message = diagnosis.advice(name);
        warn!(package = %name, attempts, diagnosis = %diagnosis, "gave up waiting for plan");
        PollOutcome::Exhausted {
            attempts,
            diagnosis,
            message,
        }
    }

    async fn resignal(&self, name: &str, requested_by: &str) {
        let Some(signal) = &self.signal else {
            return;
        };
        info!(package = %name, "plan generation failed; requesting it again");
        if let Err(e) = signal
            .send(PlanRequest::from_build(name, requested_by))
            .await
        {
            warn!(package = %name, error = %e, "plan re-request not delivered");
        }
    }
}
