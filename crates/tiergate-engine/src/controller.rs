//! Bounded iteration loop: validate, request fixes, retry, escalate.
//!
//! The controller drives repeated validation runs under explicit
//! circuit breakers (iterations, cost, consecutive Tier 1 blocks,
//! stalled score) until the score converges or a breaker trips. The
//! loop body is sequential by construction — budget state has a single
//! writer and needs no lock — and the state is persisted after every
//! transition so a crash resumes from the last completed iteration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tiergate_core::budget::{BudgetState, BudgetStore};
use tiergate_core::emit::{MetricSink, ReportEmitter};
use tiergate_core::metrics::COUNTERS;
use tiergate_core::obs::emit_loop_state;
use tiergate_core::registry::CheckContext;
use tiergate_core::{Report, RunConfig, Tier, TierResult};

use crate::score::combined_score;

/// Loop lifecycle states. Transitions happen only inside the
/// controller, never from the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Validating,
    Blocked,
    FixRequested,
    Complete,
    Escalated,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Validating => "validating",
            LoopState::Blocked => "blocked",
            LoopState::FixRequested => "fix_requested",
            LoopState::Complete => "complete",
            LoopState::Escalated => "escalated",
        };
        write!(f, "{s}")
    }
}

/// Which circuit breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxIterations,
    BudgetExhausted,
    ConsecutiveErrors,
    NoProgress,
    CorruptState,
}

/// Terminal result of one loop invocation.
#[derive(Debug, Clone, Serialize)]
pub struct LoopOutcome {
    /// Final state: `Complete` or `Escalated`.
    pub state: LoopState,

    /// Breaker that tripped, when escalated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationReason>,

    /// Iterations consumed, across restarts.
    pub iterations: u32,

    /// Combined score of the last full run, if one completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,

    /// Report from the last orchestrator run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<Report>,
}

impl LoopOutcome {
    fn escalated(reason: EscalationReason, state: &BudgetState, report: Option<Report>) -> Self {
        Self {
            state: LoopState::Escalated,
            escalation: Some(reason),
            iterations: state.iteration,
            final_score: state.last_score,
            last_report: report,
        }
    }
}

/// Tier execution seam. Implemented by the orchestrator; faked in tests
/// to script never-improving runs.
#[async_trait]
pub trait ValidationDriver: Send + Sync {
    /// Run one tier and return its aggregate result.
    async fn run_tier(&self, config: &RunConfig, ctx: &CheckContext, tier: Tier) -> TierResult;
}

/// External collaborator that applies fixes between iterations.
///
/// The controller only emits the request; deciding what to fix is out
/// of scope here.
#[async_trait]
pub trait FixRequester: Send + Sync {
    /// Request a fix for the failures in a report.
    async fn request_fix(&self, report: &Report) -> anyhow::Result<()>;
}

/// Fix requester that only logs the request.
#[derive(Debug, Default)]
pub struct TracingFixRequester;

#[async_trait]
impl FixRequester for TracingFixRequester {
    async fn request_fix(&self, report: &Report) -> anyhow::Result<()> {
        info!(
            event = "loop.fix_requested",
            run_id = %report.run_id,
            failed = report.failed_count(),
        );
        Ok(())
    }
}

/// Drives the retry loop for one project.
pub struct IterationController<D, F, S>
where
    D: ValidationDriver,
    F: FixRequester,
    S: MetricSink,
{
    driver: D,
    fixer: F,
    emitter: ReportEmitter<S>,
    store: BudgetStore,
}

impl<D, F, S> IterationController<D, F, S>
where
    D: ValidationDriver,
    F: FixRequester,
    S: MetricSink,
{
    /// Controller over a driver, a fix collaborator, a metric sink and a
    /// budget store.
    pub fn new(driver: D, fixer: F, emitter: ReportEmitter<S>, store: BudgetStore) -> Self {
        Self {
            driver,
            fixer,
            emitter,
            store,
        }
    }

    /// Borrow the report emitter (tests inspect its sink).
    pub fn emitter(&self) -> &ReportEmitter<S> {
        &self.emitter
    }

    /// Run the loop to a terminal state.
    ///
    /// Budget state is loaded first, so a restarted controller resumes
    /// at `iteration + 1` rather than iteration 0. Corrupt state (bad
    /// checksum or undecodable file) escalates immediately and is never
    /// silently reset.
    pub async fn run(&self, config: &RunConfig, ctx: &CheckContext) -> LoopOutcome {
        let project = &config.project_name;
        let bp = &config.backpressure;

        let mut state = match self.store.load(&ctx.project_root) {
            Ok(Some(state)) => {
                info!(project = %project, iteration = state.iteration, "resuming loop from persisted state");
                state
            }
            Ok(None) => BudgetState::default(),
            Err(e) => {
                warn!(project = %project, error = %e, "budget state corrupt, escalating");
                return self.escalate(EscalationReason::CorruptState, &BudgetState::default(), None, project);
            }
        };

        loop {
            state.iteration += 1;

            if state.iteration > bp.max_iterations {
                self.persist(&mut state, ctx);
                return self.escalate(EscalationReason::MaxIterations, &state, None, project);
            }
            if state.cost_usd >= bp.max_budget_usd {
                self.persist(&mut state, ctx);
                return self.escalate(EscalationReason::BudgetExhausted, &state, None, project);
            }

            emit_loop_state(project, state.iteration, "validating");
            let mut report = Report::new(project.clone());

            let tier1 = self.driver.run_tier(config, ctx, Tier::Blocker).await;
            let blocked = !tier1.passed;
            report.tiers.push(tier1);

            if blocked {
                report.blocked = true;
                COUNTERS.inc_runs_blocked();
                emit_loop_state(project, state.iteration, "blocked");
                self.emitter.emit(&report).await;

                state.consecutive_errors += 1;
                state.cost_usd += bp.estimated_cost_per_iteration;
                self.persist(&mut state, ctx);

                if state.consecutive_errors >= bp.max_consecutive_errors {
                    return self.escalate(
                        EscalationReason::ConsecutiveErrors,
                        &state,
                        Some(report),
                        project,
                    );
                }
                self.request_fix(&report, project, state.iteration).await;
                continue;
            }

            state.consecutive_errors = 0;

            // Tier 2 and Tier 3 may overlap: neither gates the other.
            let (tier2, tier3) = tokio::join!(
                self.driver.run_tier(config, ctx, Tier::Warning),
                self.driver.run_tier(config, ctx, Tier::Monitor),
            );
            report.tiers.push(tier2);
            report.tiers.push(tier3);
            self.emitter.emit(&report).await;

            let score = combined_score(&report, &config.scoring);
            info!(project = %project, iteration = state.iteration, score, "iteration scored");

            if score >= bp.min_score {
                // Persisted state exists for crash recovery mid-loop. A
                // converged loop is finished, so its bookkeeping must not
                // carry into the next invocation.
                if let Err(e) = self.store.clear(&ctx.project_root) {
                    warn!(project = %project, error = %e, "failed to clear budget state after convergence");
                }
                emit_loop_state(project, state.iteration, "complete");
                return LoopOutcome {
                    state: LoopState::Complete,
                    escalation: None,
                    iterations: state.iteration,
                    final_score: Some(score),
                    last_report: Some(report),
                };
            }

            match state.last_score {
                Some(last) if (last - score).abs() < f64::EPSILON => {
                    state.iterations_without_progress += 1;
                }
                _ => state.iterations_without_progress = 0,
            }
            state.last_score = Some(score);
            state.cost_usd += bp.estimated_cost_per_iteration;
            self.persist(&mut state, ctx);

            if state.iterations_without_progress >= bp.max_no_progress {
                return self.escalate(EscalationReason::NoProgress, &state, Some(report), project);
            }

            self.request_fix(&report, project, state.iteration).await;
        }
    }

    /// Persist after a transition; persistence failure is logged, never
    /// fatal — losing resume bookkeeping must not abort validation.
    fn persist(&self, state: &mut BudgetState, ctx: &CheckContext) {
        if let Err(e) = self.store.save(&ctx.project_root, state) {
            warn!(error = %e, "failed to persist budget state");
        }
    }

    async fn request_fix(&self, report: &Report, project: &str, iteration: u32) {
        COUNTERS.inc_fix_requests();
        emit_loop_state(project, iteration, "fix_requested");
        if let Err(e) = self.fixer.request_fix(report).await {
            warn!(project = %project, error = %e, "fix request failed");
        }
    }

    fn escalate(
        &self,
        reason: EscalationReason,
        state: &BudgetState,
        report: Option<Report>,
        project: &str,
    ) -> LoopOutcome {
        COUNTERS.inc_escalations();
        emit_loop_state(project, state.iteration, "escalated");
        warn!(project = %project, reason = ?reason, "loop escalated, human attention required");
        LoopOutcome::escalated(reason, state, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_display() {
        assert_eq!(LoopState::FixRequested.to_string(), "fix_requested");
        assert_eq!(LoopState::Escalated.to_string(), "escalated");
    }

    #[test]
    fn test_loop_state_serde_snake_case() {
        let json = serde_json::to_string(&LoopState::FixRequested).unwrap();
        assert_eq!(json, "\"fix_requested\"");
        let reason: EscalationReason = serde_json::from_str("\"no_progress\"").unwrap();
        assert_eq!(reason, EscalationReason::NoProgress);
    }
}
