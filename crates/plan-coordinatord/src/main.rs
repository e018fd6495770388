//! Plan coordinator service.
//!
//! Owns the plan queue for one workspace. Requests arrive from `suite build`
//! and `suite request-plan` through the workspace spool directory and are
//! forwarded into the coordinator's in-process inbox.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use plan_coordinator::{
    drain_spool, CommandPlanGenerator, CoordinatorConfig, PlanCoordinator, PlanSignal,
};
use suite_core::WorkspaceLock;
use suite_registry::HttpRegistryClient;
use suite_toolchain::ProcessRunner;

#[derive(Parser)]
#[command(name = "plan-coordinatord")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Queue and generate package plans for a suite workspace", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Workspace root
    #[arg(long, env = "SUITE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Command that writes a plan; invoked as `<cmd> <package> <output-path> [deps]`
    #[arg(long, env = "SUITE_PLAN_CMD", default_value = "suite-plan")]
    generator_cmd: String,

    /// Plan generation timeout in seconds
    #[arg(long, default_value_t = 1800)]
    generator_timeout_secs: u64,

    /// Seconds to sleep between discovery scans while idle
    #[arg(long, default_value_t = 30)]
    idle_secs: u64,

    /// Maximum registry records pulled per discovery scan
    #[arg(long, default_value_t = 10)]
    discovery_limit: usize,

    /// Milliseconds between spool directory polls
    #[arg(long, default_value_t = 500)]
    spool_poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    suite_core::init_tracing(args.json, level);

    let command: Vec<String> = args
        .generator_cmd
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if command.is_empty() {
        anyhow::bail!("Plan generator command is empty");
    }

    let registry =
        HttpRegistryClient::from_env().context("Failed to configure registry client")?;
    let generator = CommandPlanGenerator::new(command, Arc::new(ProcessRunner::new()))
        .with_timeout(args.generator_timeout_secs)
        .in_dir(args.workspace.clone());
    let config = CoordinatorConfig::for_workspace(&args.workspace)
        .with_idle_interval(Duration::from_secs(args.idle_secs))
        .with_discovery_limit(args.discovery_limit);
    let spool_dir = config.spool_dir.clone();
    let _singleton = acquire_singleton(&config.lock_path())?;

    let coordinator = PlanCoordinator::new(config, Arc::new(registry), Arc::new(generator));
    let signal = coordinator.signal();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let inbox = tokio::spawn(forward_spool(
        spool_dir,
        signal,
        Duration::from_millis(args.spool_poll_ms),
        shutdown_rx.clone(),
    ));
    let service = tokio::spawn(coordinator.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    inbox.await.context("Spool forwarder panicked")?;
    service
        .await
        .context("Plan coordinator panicked")?
        .context("Plan coordinator stopped with an error")?;
    Ok(())
}

/// Exclusive lock held for the daemon's lifetime; one coordinator per workspace.
fn acquire_singleton(path: &Path) -> Result<WorkspaceLock> {
    match WorkspaceLock::try_acquire_file(path, "plan-coordinatord")
        .with_context(|| format!("Failed to open coordinator lock {:?}", path))?
    {
        Some(lock) => {
            info!(lock = %path.display(), "holding coordinator lock");
            Ok(lock)
        }
        None => {
            let holder = WorkspaceLock::read_holder(path)
                .map(|h| h.to_string())
                .unwrap_or_else(|| "unknown holder".to_string());
            anyhow::bail!(
                "plan-coordinatord is already running for this workspace ({}; lock {:?})",
                holder,
                path
            )
        }
    }
}

/// Move spooled requests into `signal` until `shutdown` flips.
async fn forward_spool(
    dir: PathBuf,
    signal: impl PlanSignal,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(spool = %dir.display(), "watching plan request spool");
    loop {
        if *shutdown.borrow() {
            break;
        }
        if forward_once(&dir, &signal).await.is_err() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One spool pass. `Err` only when the coordinator inbox is gone.
async fn forward_once(dir: &Path, signal: &impl PlanSignal) -> Result<usize> {
    let requests = match drain_spool(dir).await {
        Ok(requests) => requests,
        Err(e) => {
            warn!(spool = %dir.display(), error = %e, "spool read failed");
            return Ok(0);
        }
    };

    let count = requests.len();
    for request in requests {
        let package = request.package.clone();
        signal
            .send(request)
            .await
            .with_context(|| format!("Coordinator inbox closed while forwarding {}", package))?;
    }
    Ok(count)
}
