//! tiergate - tiered validation orchestrator CLI
//!
//! The `tiergate` command runs validation dimensions in severity tiers
//! and drives the bounded fix-and-retry loop.
//!
//! ## Commands
//!
//! - `validate`: Run one tier (or all tiers) once and report
//! - `iterate`: Run the iteration loop until convergence or escalation
//!
//! Exit codes: 0 = requested tier(s) passed, 1 = Tier 1 blocked or the
//! loop escalated, 2 = configuration or orchestrator error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use tiergate_core::registry::{CheckContext, CheckerRegistry};
use tiergate_core::{
    compose, default_global_path, load_plugins, project_config_path, BudgetStore, Report,
    ReportEmitter, RunConfig, Tier, TracingSink, COUNTERS,
};
use tiergate_engine::{
    combined_score, IterationController, LoopOutcome, LoopState, Orchestrator, TracingFixRequester,
};

#[derive(Parser)]
#[command(name = "tiergate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tiered validation orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run validation once and report the outcome
    ///
    /// Only a Tier 1 (blocker) failure exits 1. Tier 2/3 failures are
    /// reported in full but still exit 0: warnings never block, so
    /// `validate 2` succeeds even when Tier 2 checks fail. Exit 2 means
    /// a configuration or orchestrator error.
    Validate {
        /// Scope: tier number (1, 2, 3), "all", or "quick" (alias for 1)
        #[arg(default_value = "all")]
        scope: String,

        /// Print the report as JSON instead of terminal text
        #[arg(long)]
        json: bool,

        /// Changed files (comma-separated); restricts dimensions by file type
        #[arg(long)]
        files: Option<String>,

        /// Project name (default: taken from config, then the root directory name)
        #[arg(short, long)]
        project: Option<String>,

        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Run the bounded iteration loop until convergence or escalation
    Iterate {
        /// Print the loop outcome as JSON instead of terminal text
        #[arg(long)]
        json: bool,

        /// Project name (default: taken from config, then the root directory name)
        #[arg(short, long)]
        project: Option<String>,

        /// Project root directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },
}

/// What `validate` was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Single(Tier),
    All,
}

fn parse_scope(raw: &str) -> Result<Scope> {
    match raw {
        "1" | "quick" => Ok(Scope::Single(Tier::Blocker)),
        "2" => Ok(Scope::Single(Tier::Warning)),
        "3" => Ok(Scope::Single(Tier::Monitor)),
        "all" => Ok(Scope::All),
        other => anyhow::bail!("unknown scope '{}' (expected 1, 2, 3, all or quick)", other),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tiergate_core::init_tracing(cli.json_logs, level);

    let result = match cli.command {
        Commands::Validate {
            scope,
            json,
            files,
            project,
            root,
        } => cmd_validate(&scope, json, files.as_deref(), project, &root).await,
        Commands::Iterate {
            json,
            project,
            root,
        } => cmd_iterate(json, project, &root).await,
    };

    COUNTERS.flush();

    match result {
        Ok(passed) => {
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Compose config for a project root and wire up the checker registry.
fn setup(root: &std::path::Path, project: Option<String>) -> Result<(RunConfig, Orchestrator)> {
    if !root.is_dir() {
        anyhow::bail!("project root is not a directory: {:?}", root);
    }

    let project_path = project_config_path(root);
    let mut config = compose(default_global_path().as_deref(), Some(&project_path));

    if let Some(name) = project {
        config.project_name = name;
    }
    if config.project_name.is_empty() {
        config.project_name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unnamed".to_string());
    }

    let plugins = load_plugins(&config.plugins, config.default_timeout_secs);
    let plugin_names: Vec<String> = plugins.keys().cloned().collect();
    config.register_plugin_dimensions(plugin_names.iter().map(String::as_str));

    let registry = CheckerRegistry::build(&config, plugins);
    info!(
        project = %config.project_name,
        checkers = registry.len(),
        plugins = plugin_names.len(),
        "registry built"
    );

    Ok((config, Orchestrator::new(registry)))
}

fn check_context(root: &std::path::Path, files: Option<&str>) -> CheckContext {
    let ctx = CheckContext::new(root);
    match files {
        Some(list) => ctx.with_files(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
        ),
        None => ctx,
    }
}

/// Run validation once and report. Returns whether the run passed for
/// exit-code purposes: only a Tier 1 block fails the command.
async fn cmd_validate(
    scope: &str,
    json: bool,
    files: Option<&str>,
    project: Option<String>,
    root: &std::path::Path,
) -> Result<bool> {
    let scope = parse_scope(scope)?;
    let (config, orchestrator) = setup(root, project)?;
    let ctx = check_context(root, files);

    let report = match scope {
        Scope::All => orchestrator.run_all(&config, &ctx).await,
        Scope::Single(tier) => {
            let mut report = Report::new(&config.project_name);
            let result = orchestrator.run_tier(&config, &ctx, tier).await;
            report.blocked = tier == Tier::Blocker && !result.passed;
            report.tiers.push(result);
            report
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &config);
    }

    Ok(!report.blocked)
}

/// Run the iteration loop. Returns whether the loop completed (vs
/// escalated) for exit-code purposes.
async fn cmd_iterate(json: bool, project: Option<String>, root: &std::path::Path) -> Result<bool> {
    let (config, orchestrator) = setup(root, project)?;
    let ctx = CheckContext::new(root);

    let store = BudgetStore::default_location()
        .context("cannot locate budget state directory ($HOME not set)")?;
    let controller = IterationController::new(
        orchestrator,
        TracingFixRequester,
        ReportEmitter::new(TracingSink),
        store,
    );

    let outcome = controller.run(&config, &ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(outcome.state == LoopState::Complete)
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Blocker => "blocker",
        Tier::Warning => "warning",
        Tier::Monitor => "monitor",
    }
}

fn print_report(report: &Report, config: &RunConfig) {
    println!("Project: {}", report.project);
    println!("Run: {}", report.run_id);
    println!();

    for tier in &report.tiers {
        let status = if tier.passed { "✓" } else { "✗" };
        println!("Tier {} ({}) {}", tier.tier, tier_label(tier.tier), status);
        for result in &tier.results {
            let mark = if result.passed { "✓" } else { "✗" };
            println!(
                "  {} {} ({}ms): {}",
                mark, result.dimension, result.duration_ms, result.message
            );
            if let Some(fix) = &result.fix_suggestion {
                println!("      fix: {}", fix);
            }
        }
    }

    println!();
    if report.blocked {
        println!("✗ BLOCKED: fix Tier 1 failures before anything else runs");
    } else {
        let score = combined_score(report, &config.scoring);
        println!(
            "Summary: {}/{} checks passed, score {:.1}",
            report.passed_count(),
            report.passed_count() + report.failed_count(),
            score
        );
    }
}

fn print_outcome(outcome: &LoopOutcome) {
    println!("State: {}", outcome.state);
    println!("Iterations: {}", outcome.iterations);
    if let Some(score) = outcome.final_score {
        println!("Final score: {:.1}", score);
    }
    if let Some(reason) = &outcome.escalation {
        println!("Escalated: {:?}", reason);
    }
    if let Some(report) = &outcome.last_report {
        println!(
            "Last run: {}/{} checks passed",
            report.passed_count(),
            report.passed_count() + report.failed_count()
        );
    }
}
