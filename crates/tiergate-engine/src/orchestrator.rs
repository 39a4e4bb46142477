//! Tiered orchestration of validation dimensions.
//!
//! Tiers run strictly in order; dimensions within one tier run
//! concurrently under bounded parallelism, and the fan-in join is the
//! only point where execution blocks. A Tier 1 failure short-circuits
//! the run: blockers gate everything else. Tier 2 warnings never block,
//! and Tier 3 is purely observational.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use tiergate_core::metrics::COUNTERS;
use tiergate_core::obs;
use tiergate_core::registry::{CheckContext, CheckerRegistry};
use tiergate_core::{
    BuiltinDimension, CheckResult, DimensionConfig, Report, RunConfig, Tier, TierResult,
};

use crate::controller::ValidationDriver;

/// Executes tiers against a checker registry.
pub struct Orchestrator {
    registry: Arc<CheckerRegistry>,
}

impl Orchestrator {
    /// Orchestrator over a built registry.
    pub fn new(registry: CheckerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Run all tiers and aggregate a report.
    ///
    /// Tier 1 runs first; if it blocks, Tiers 2 and 3 are absent from
    /// the report. Otherwise Tiers 2 and 3 run concurrently with each
    /// other — neither gates the other.
    pub async fn run_all(&self, config: &RunConfig, ctx: &CheckContext) -> Report {
        let mut report = Report::new(&config.project_name);
        let _span = obs::RunSpan::enter(&report.run_id);
        obs::emit_run_started(&report.run_id, &config.project_name);

        let tier1 = self.run_tier(config, ctx, Tier::Blocker).await;
        obs::emit_tier_completed(&report.run_id, Tier::Blocker, tier1.passed, tier1.results.len());
        let tier1_passed = tier1.passed;
        let tier1_failed = tier1.results.iter().filter(|r| !r.passed).count();
        report.tiers.push(tier1);

        if !tier1_passed {
            report.blocked = true;
            COUNTERS.inc_runs_blocked();
            obs::emit_run_blocked(&report.run_id, tier1_failed);
            obs::emit_run_finished(
                &report.run_id,
                true,
                report.passed_count(),
                report.failed_count(),
            );
            return report;
        }

        let (tier2, tier3) = tokio::join!(
            self.run_tier(config, ctx, Tier::Warning),
            self.run_tier(config, ctx, Tier::Monitor),
        );
        obs::emit_tier_completed(&report.run_id, Tier::Warning, tier2.passed, tier2.results.len());
        obs::emit_tier_completed(&report.run_id, Tier::Monitor, tier3.passed, tier3.results.len());
        report.tiers.push(tier2);
        report.tiers.push(tier3);

        obs::emit_run_finished(
            &report.run_id,
            false,
            report.passed_count(),
            report.failed_count(),
        );
        report
    }

    /// Run one tier: fan out every applicable dimension, fan in at the
    /// join. Completion order within the tier is unspecified.
    pub async fn run_tier(&self, config: &RunConfig, ctx: &CheckContext, tier: Tier) -> TierResult {
        let dims: Vec<DimensionConfig> = config
            .dimensions_in_tier(tier)
            .into_iter()
            .filter(|d| dimension_applies(d, ctx.changed_files.as_deref()))
            .cloned()
            .collect();

        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let ctx = Arc::new(ctx.clone());
        let default_timeout = config.default_timeout_secs;

        let mut names = Vec::with_capacity(dims.len());
        let mut tasks = Vec::with_capacity(dims.len());
        for dim in dims {
            names.push(dim.name.clone());
            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&semaphore);
            let ctx = Arc::clone(&ctx);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("tier semaphore closed mid-run");
                run_checker(&registry, &dim, &ctx, default_timeout).await
            }));
        }

        let mut results = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    // A panicking checker task is contained here and
                    // attributed to the dimension it ran for.
                    warn!(tier = %tier, dimension = %name, error = %e, "checker task panicked");
                    results.push(CheckResult::crashed(&name, tier, &e.to_string(), 0));
                }
            }
        }

        TierResult::new(tier, results)
    }
}

/// Run one checker with crash containment and a per-checker timeout.
async fn run_checker(
    registry: &CheckerRegistry,
    dim: &DimensionConfig,
    ctx: &CheckContext,
    default_timeout_secs: u64,
) -> CheckResult {
    let handle = registry.resolve(&dim.name);
    let timeout_secs = dim.timeout_param().unwrap_or(default_timeout_secs);
    let start = Instant::now();

    info!(dimension = %dim.name, tier = %dim.tier, kind = handle.kind(), "running checker");
    COUNTERS.inc_checks_executed();

    let outcome = if timeout_secs > 0 {
        match tokio::time::timeout(Duration::from_secs(timeout_secs), handle.run(dim, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                return CheckResult::crashed(
                    &dim.name,
                    dim.tier,
                    &format!("timed out after {timeout_secs}s"),
                    duration_ms,
                );
            }
        }
    } else {
        handle.run(dim, ctx).await
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(outcome) => CheckResult::from_outcome(&dim.name, dim.tier, outcome, duration_ms),
        Err(e) => {
            warn!(dimension = %dim.name, error = %e, "checker failed");
            CheckResult::crashed(&dim.name, dim.tier, &e.to_string(), duration_ms)
        }
    }
}

/// Deterministic file-type filter for tier-scoped subset execution.
///
/// A dimension applies when no file filter is present, when it declares
/// no extension mapping (conservative default), or when any changed file
/// carries one of its extensions.
fn dimension_applies(dim: &DimensionConfig, changed_files: Option<&[std::path::PathBuf]>) -> bool {
    let Some(files) = changed_files else {
        return true;
    };
    let extensions = dim
        .extensions_param()
        .or_else(|| {
            BuiltinDimension::by_name(&dim.name)
                .map(|b| b.extensions().iter().map(|s| (*s).to_string()).collect())
        });
    let Some(extensions) = extensions else {
        return true;
    };
    files.iter().any(|f| {
        file_extension(f)
            .map(|ext| extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    })
}

fn file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

#[async_trait]
impl ValidationDriver for Orchestrator {
    async fn run_tier(&self, config: &RunConfig, ctx: &CheckContext, tier: Tier) -> TierResult {
        Orchestrator::run_tier(self, config, ctx, tier).await
    }
}
