//! Suite - build orchestrator CLI
//!
//! The `suite` command drives a package suite from source to registry.
//!
//! ## Commands
//!
//! - `build`: Resolve, build, verify, publish and propagate a package and its dependencies
//! - `resolve`: Show the dependency order for a package
//! - `score`: Run the quality gate against a single package directory
//! - `bump`: Compute the next version for a change class
//! - `request-plan`: Ask the plan coordinator for a package plan
//! - `status`: Show the registry record for a package
//! - `report`: Load and verify a persisted run report

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use plan_coordinator::{PlanRequest, PlanSignal, SpoolSignal, SOURCE_CLI};
use suite_core::{
    bump_version, read_suite_report, BuildExecutor, ChangeType, CommandImplementationGenerator,
    CommandPublishTransport, ComplianceGate, PackageManifest, PackageNode, RunOptions,
    SuiteConfig, SuiteOrchestrator, SuiteReport, Visibility,
};
use suite_registry::{HttpRegistryClient, RegistryClient};
use suite_toolchain::{ProcessRunner, Toolchain};

/// Default location of persisted run reports, relative to the workspace.
const DEFAULT_REPORT_DIR: &str = ".suite/reports";

#[derive(Parser)]
#[command(name = "suite")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, verify and publish a suite of interdependent packages", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workspace root holding the suite's packages and plans
    #[arg(long, global = true, env = "SUITE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a package and everything it depends on, then publish in dependency order
    Build {
        /// Package name (e.g. @suite/cache)
        package: String,

        /// Version bump applied to packages whose current version is already published
        #[arg(long)]
        bump: Option<ChangeType>,

        /// Registry visibility (public or restricted)
        #[arg(long)]
        visibility: Option<Visibility>,

        /// Run every step but do not publish or touch dependents
        #[arg(long)]
        dry_run: bool,

        /// Command that generates a package from its plan
        #[arg(long, env = "SUITE_IMPLEMENT_CMD", default_value = "suite-implement")]
        implement_cmd: String,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        report_json: bool,
    },

    /// Show the dependency order for a package without building it
    Resolve {
        /// Package name
        package: String,
    },

    /// Run structure, type, lint and test checks on one package and print its score
    Score {
        /// Package directory (the one holding package.json)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Print the version that follows CURRENT for a change class
    Bump {
        /// Current version (MAJOR.MINOR.PATCH)
        current: String,

        /// major, minor or patch
        change: String,
    },

    /// Queue a plan request for the plan coordinator
    RequestPlan {
        /// Package name
        package: String,
    },

    /// Show the registry record for a package
    Status {
        /// Package name
        package: String,
    },

    /// Load and verify a persisted run report
    Report {
        /// Run ID printed by `suite build`
        run_id: String,

        /// Report directory (default: <workspace>/.suite/reports)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    suite_core::init_tracing(cli.json, level);

    let config = suite_config(&cli.workspace);

    match cli.command {
        Commands::Build {
            package,
            bump,
            visibility,
            dry_run,
            implement_cmd,
            report_json,
        } => {
            let options = RunOptions {
                bump,
                visibility,
                dry_run: dry_run.then_some(true),
            };
            cmd_build(config, &package, &options, &implement_cmd, report_json).await
        }
        Commands::Resolve { package } => cmd_resolve(config, &package).await,
        Commands::Score { dir } => cmd_score(config, &dir).await,
        Commands::Bump { current, change } => {
            println!("{}", cmd_bump(&current, &change)?);
            Ok(())
        }
        Commands::RequestPlan { package } => cmd_request_plan(&config.workspace_root, &package).await,
        Commands::Status { package } => cmd_status(&package).await,
        Commands::Report { run_id, dir } => {
            let dir = dir.unwrap_or_else(|| report_dir(&config));
            let report = read_suite_report(&run_id, &dir)
                .with_context(|| format!("Failed to load report {} from {:?}", run_id, dir))?;
            print_report(&report);
            Ok(())
        }
    }
}

/// Environment-derived config rooted at `workspace`, with reports persisted by default.
fn suite_config(workspace: &Path) -> SuiteConfig {
    let config = SuiteConfig::for_workspace(workspace);
    if config.report_dir.is_some() {
        config
    } else {
        let dir = workspace.join(DEFAULT_REPORT_DIR);
        config.with_report_dir(dir)
    }
}

fn report_dir(config: &SuiteConfig) -> PathBuf {
    config
        .report_dir
        .clone()
        .unwrap_or_else(|| config.workspace_root.join(DEFAULT_REPORT_DIR))
}

fn registry_client() -> Result<Arc<dyn RegistryClient>> {
    let client = HttpRegistryClient::from_env().context("Failed to configure registry client")?;
    Ok(Arc::new(client))
}

/// Split a shell-style command line on whitespace.
fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Build a package and its dependency closure
async fn cmd_build(
    config: SuiteConfig,
    package: &str,
    options: &RunOptions,
    implement_cmd: &str,
    report_json: bool,
) -> Result<()> {
    let implement = split_command(implement_cmd);
    if implement.is_empty() {
        anyhow::bail!("Implementation command is empty");
    }

    let config = Arc::new(config);
    let toolchain: Arc<dyn Toolchain> = Arc::new(ProcessRunner::new());
    let transport = CommandPublishTransport::new(config.package_manager.clone(), toolchain.clone())
        .with_timeout(config.publish_timeout_secs);
    let implementer = CommandImplementationGenerator::new(implement, toolchain.clone())
        .in_dir(config.workspace_root.clone());
    let signal = SpoolSignal::for_workspace(&config.workspace_root);

    let orchestrator = SuiteOrchestrator::new(
        config.clone(),
        registry_client()?,
        toolchain,
        Arc::new(signal),
        Arc::new(transport),
        Arc::new(implementer),
    );

    info!(package = %package, workspace = ?config.workspace_root, "starting suite build");
    let report = orchestrator
        .run(package, options)
        .await
        .with_context(|| format!("Suite build for {} failed to run", package))?;

    if report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.all_published() {
        Ok(())
    } else {
        anyhow::bail!("Suite build did not publish every package")
    }
}

fn print_report(report: &SuiteReport) {
    println!("Run ID: {}", report.run_id);
    println!("Target: {}", report.target);
    if let Some(ms) = report.duration_ms() {
        println!("Duration: {}ms", ms);
    }
    println!();

    for pkg in &report.packages {
        let mark = if pkg.status.is_success() { "✓" } else { "✗" };
        let mut line = format!("  {} {} [{}]", mark, pkg.name, pkg.status);
        if let Some(score) = pkg.score() {
            line.push_str(&format!(" score {:.1}", score));
        }
        if let Some(change) = &pkg.version_change {
            line.push_str(&format!(" {} -> {}", change.previous, change.new));
        }
        println!("{}", line);
        if let Some(detail) = &pkg.detail {
            for l in detail.lines() {
                println!("      {}", l);
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} packages published",
        report.count(suite_core::PackageOutcomeStatus::Published),
        report.packages.len()
    );
}

/// Print the build order and anything that could not be found locally
async fn cmd_resolve(config: SuiteConfig, package: &str) -> Result<()> {
    let resolver = suite_core::DependencyResolver::new(Arc::new(config), registry_client()?);
    let tree = resolver
        .build_dependency_tree(package)
        .await
        .with_context(|| format!("Failed to resolve {}", package))?;

    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// Score one package directory against the quality gate
async fn cmd_score(config: SuiteConfig, dir: &Path) -> Result<()> {
    let manifest = PackageManifest::load_dir(dir)
        .with_context(|| format!("Failed to read manifest in {:?}", dir))?
        .with_context(|| format!("No package.json in {:?}", dir))?;
    let node = PackageNode::from_manifest(&manifest, &config.scope, &config.package_manager);

    let config = Arc::new(config);
    let toolchain: Arc<dyn Toolchain> = Arc::new(ProcessRunner::new());
    let executor = BuildExecutor::new(config.clone(), toolchain.clone());
    let gate = ComplianceGate::new(config, toolchain);

    let result = gate.evaluate(&node, &executor, None).await;

    println!("Package: {}", node.name);
    for category in &result.score.breakdown {
        println!(
            "  {:<20} {:>5.1} / {:>4.1}",
            format!("{:?}", category.category),
            category.earned,
            category.weight
        );
    }
    println!();
    println!("Score: {:.1} ({})", result.score.total, result.level().as_str());
    for diagnostic in result.diagnostics().into_iter().take(20) {
        println!("  - {}", diagnostic);
    }

    if result.is_publishable() {
        Ok(())
    } else {
        anyhow::bail!("{} is below the publish threshold", node.name)
    }
}

fn cmd_bump(current: &str, change: &str) -> Result<String> {
    bump_version(current, change).with_context(|| format!("Cannot bump {} by {}", current, change))
}

/// Drop a plan request into the workspace spool for plan-coordinatord
async fn cmd_request_plan(workspace: &Path, package: &str) -> Result<()> {
    let signal = SpoolSignal::for_workspace(workspace);
    let request = PlanRequest::from_build(package, "suite-cli").with_source(SOURCE_CLI);
    signal
        .send(request)
        .await
        .with_context(|| format!("Failed to queue plan request for {}", package))?;

    println!("Queued plan request for {} in {:?}", package, signal.dir());
    Ok(())
}

async fn cmd_status(package: &str) -> Result<()> {
    let registry = registry_client()?;
    match registry
        .get(package)
        .await
        .with_context(|| format!("Registry lookup for {} failed", package))?
    {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("{} is not known to the registry", package),
    }
    Ok(())
}
