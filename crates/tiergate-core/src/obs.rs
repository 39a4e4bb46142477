//! Structured observability hooks for run and loop lifecycle events.
//!
//! Events are emitted at `info!` level. For JSON output, pass
//! `json = true` to [`crate::telemetry::init_tracing`].

use tracing::info;

use crate::domain::Tier;

/// RAII guard that enters a run-scoped tracing span for the duration of
/// a run.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("tiergate.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: validation run started.
pub fn emit_run_started(run_id: &str, project: &str) {
    info!(event = "run.started", run_id = %run_id, project = %project);
}

/// Emit event: one tier completed.
pub fn emit_tier_completed(run_id: &str, tier: Tier, passed: bool, checks: usize) {
    info!(
        event = "tier.completed",
        run_id = %run_id,
        tier = %tier,
        passed = passed,
        checks = checks,
    );
}

/// Emit event: Tier 1 blocked the run.
pub fn emit_run_blocked(run_id: &str, failed: usize) {
    info!(event = "run.blocked", run_id = %run_id, failed = failed);
}

/// Emit event: validation run finished.
pub fn emit_run_finished(run_id: &str, blocked: bool, passed: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        blocked = blocked,
        passed = passed,
        failed = failed,
    );
}

/// Emit event: iteration loop transitioned state.
pub fn emit_loop_state(project: &str, iteration: u32, state: &str) {
    info!(event = "loop.state", project = %project, iteration = iteration, state = %state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        // Just ensure RunSpan::enter doesn't panic
        let _span = RunSpan::enter("test-run-id");
        emit_run_started("test-run-id", "demo");
        emit_tier_completed("test-run-id", Tier::Blocker, true, 3);
    }
}
