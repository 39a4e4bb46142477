//! Circuit-breaker and convergence tests for the iteration controller,
//! driven by scripted validation drivers that never touch real tools.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tiergate_core::budget::{BudgetState, BudgetStore};
use tiergate_core::emit::{MemorySink, ReportEmitter};
use tiergate_core::registry::CheckContext;
use tiergate_core::{compose, CheckResult, Report, RunConfig, Tier, TierResult};
use tiergate_engine::{
    EscalationReason, FixRequester, IterationController, LoopState, ValidationDriver,
};

fn check(dim: &str, tier: Tier, passed: bool) -> CheckResult {
    CheckResult {
        dimension: dim.to_string(),
        tier,
        passed,
        message: String::new(),
        details: Value::Null,
        duration_ms: 1,
        fix_suggestion: None,
    }
}

/// Driver with a fixed Tier 1 verdict and a fixed Tier 2 pass rate
/// (out of five dimensions). Tier 3 is always empty.
struct FlatDriver {
    tier1_passes: bool,
    tier2_passing: usize,
}

#[async_trait]
impl ValidationDriver for FlatDriver {
    async fn run_tier(&self, _config: &RunConfig, _ctx: &CheckContext, tier: Tier) -> TierResult {
        match tier {
            Tier::Blocker => TierResult::new(
                tier,
                vec![check("security", tier, self.tier1_passes)],
            ),
            Tier::Warning => TierResult::new(
                tier,
                (0..5usize)
                    .map(|i| check(&format!("w{i}"), tier, i < self.tier2_passing))
                    .collect(),
            ),
            Tier::Monitor => TierResult::new(tier, vec![]),
        }
    }
}

/// Driver whose Tier 2 pass rate improves on every invocation.
struct ImprovingDriver {
    calls: AtomicU32,
}

#[async_trait]
impl ValidationDriver for ImprovingDriver {
    async fn run_tier(&self, _config: &RunConfig, _ctx: &CheckContext, tier: Tier) -> TierResult {
        match tier {
            Tier::Blocker => TierResult::new(tier, vec![check("security", tier, true)]),
            Tier::Warning => {
                let round = self.calls.fetch_add(1, Ordering::SeqCst);
                let passing = if round == 0 { 2 } else { 5 };
                TierResult::new(
                    tier,
                    (0..5)
                        .map(|i| check(&format!("w{i}"), tier, (i as u32) < passing))
                        .collect(),
                )
            }
            Tier::Monitor => TierResult::new(tier, vec![]),
        }
    }
}

#[derive(Default)]
struct CountingFixer {
    requests: Arc<AtomicU32>,
}

#[async_trait]
impl FixRequester for CountingFixer {
    async fn request_fix(&self, _report: &Report) -> anyhow::Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config with score weights isolated to Tier 2 and the given breakers.
fn loop_config(
    max_iterations: u32,
    max_budget_usd: f64,
    max_consecutive_errors: u32,
    max_no_progress: u32,
) -> RunConfig {
    let mut config = compose(None, None);
    config.project_name = "loop-test".to_string();
    config.scoring.tier2_weight = 1.0;
    config.scoring.tier3_weight = 0.0;
    config.backpressure.min_score = 90.0;
    config.backpressure.max_iterations = max_iterations;
    config.backpressure.max_budget_usd = max_budget_usd;
    config.backpressure.max_consecutive_errors = max_consecutive_errors;
    config.backpressure.max_no_progress = max_no_progress;
    config.backpressure.estimated_cost_per_iteration = 0.25;
    config
}

fn controller<D: ValidationDriver>(
    driver: D,
    store: BudgetStore,
) -> IterationController<D, CountingFixer, MemorySink> {
    IterationController::new(
        driver,
        CountingFixer::default(),
        ReportEmitter::new(MemorySink::new()),
        store,
    )
}

#[tokio::test]
async fn test_converges_when_score_improves() {
    let dir = tempfile::tempdir().unwrap();
    let ctrl = controller(
        ImprovingDriver { calls: AtomicU32::new(0) },
        BudgetStore::new(dir.path().join("state")),
    );
    let config = loop_config(10, 100.0, 3, 3);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;

    assert_eq!(outcome.state, LoopState::Complete);
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.final_score.unwrap() >= 90.0);
    assert!(outcome.escalation.is_none());
}

#[tokio::test]
async fn test_max_iterations_breaker() {
    let dir = tempfile::tempdir().unwrap();
    // Score stuck at 40, no-progress breaker out of reach: only the
    // iteration cap can stop the loop.
    let ctrl = controller(
        FlatDriver { tier1_passes: true, tier2_passing: 2 },
        BudgetStore::new(dir.path().join("state")),
    );
    let config = loop_config(2, 100.0, 10, 100);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;

    assert_eq!(outcome.state, LoopState::Escalated);
    assert_eq!(outcome.escalation, Some(EscalationReason::MaxIterations));
}

#[tokio::test]
async fn test_budget_breaker() {
    let dir = tempfile::tempdir().unwrap();
    let ctrl = controller(
        FlatDriver { tier1_passes: true, tier2_passing: 2 },
        BudgetStore::new(dir.path().join("state")),
    );
    // 0.25 per iteration: the cap of 0.5 is reached after two
    // iterations and trips before the third runs.
    let config = loop_config(100, 0.5, 10, 100);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;

    assert_eq!(outcome.state, LoopState::Escalated);
    assert_eq!(outcome.escalation, Some(EscalationReason::BudgetExhausted));
    assert_eq!(outcome.iterations, 3);
}

#[tokio::test]
async fn test_consecutive_errors_breaker() {
    let dir = tempfile::tempdir().unwrap();
    let fixer = CountingFixer::default();
    let requests = Arc::clone(&fixer.requests);
    let ctrl = IterationController::new(
        FlatDriver { tier1_passes: false, tier2_passing: 0 },
        fixer,
        ReportEmitter::new(MemorySink::new()),
        BudgetStore::new(dir.path().join("state")),
    );
    let config = loop_config(100, 100.0, 3, 100);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;

    assert_eq!(outcome.state, LoopState::Escalated);
    assert_eq!(outcome.escalation, Some(EscalationReason::ConsecutiveErrors));
    assert_eq!(outcome.iterations, 3);
    // A fix was requested after each block except the escalating one.
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    assert!(outcome.last_report.as_ref().unwrap().blocked);
}

#[tokio::test]
async fn test_no_progress_breaker_fires_at_iteration_four() {
    let dir = tempfile::tempdir().unwrap();
    // Score sequence [40, 40, 40, 40] with max_no_progress = 3 must
    // escalate at iteration 4, not later.
    let ctrl = controller(
        FlatDriver { tier1_passes: true, tier2_passing: 2 },
        BudgetStore::new(dir.path().join("state")),
    );
    let config = loop_config(100, 100.0, 10, 3);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;

    assert_eq!(outcome.state, LoopState::Escalated);
    assert_eq!(outcome.escalation, Some(EscalationReason::NoProgress));
    assert_eq!(outcome.iterations, 4);
    assert_eq!(outcome.final_score, Some(40.0));
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let store = BudgetStore::new(dir.path().join("state"));
    let project = dir.path().to_path_buf();

    // Simulate a previous process that completed five iterations.
    let prior = BudgetState {
        iteration: 5,
        cost_usd: 1.25,
        consecutive_errors: 0,
        iterations_without_progress: 0,
        last_score: Some(40.0),
    };
    store.save(&project, &prior).unwrap();

    let ctrl = controller(
        FlatDriver { tier1_passes: false, tier2_passing: 0 },
        store,
    );
    let config = loop_config(100, 100.0, 1, 100);

    let outcome = ctrl.run(&config, &CheckContext::new(&project)).await;

    // First iteration after the restart is number 6, not 1.
    assert_eq!(outcome.iterations, 6);
}

#[tokio::test]
async fn test_convergence_clears_state_for_future_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = BudgetStore::new(dir.path().join("state"));
    let project = dir.path().to_path_buf();
    let config = loop_config(2, 100.0, 3, 3);

    // A healthy project iterated repeatedly must converge every time;
    // iteration counts from completed loops never accumulate toward the
    // iteration cap of a later loop.
    for _ in 0..3 {
        let ctrl = controller(
            FlatDriver { tier1_passes: true, tier2_passing: 5 },
            store.clone(),
        );
        let outcome = ctrl.run(&config, &CheckContext::new(&project)).await;
        assert_eq!(outcome.state, LoopState::Complete);
        assert_eq!(outcome.iterations, 1);
    }

    // Nothing left on disk to resume from.
    assert!(store.load(&project).unwrap().is_none());
}

#[tokio::test]
async fn test_corrupted_state_escalates() {
    let dir = tempfile::tempdir().unwrap();
    let store = BudgetStore::new(dir.path().join("state"));
    let project = dir.path().to_path_buf();

    store.save(&project, &BudgetState::default()).unwrap();

    // Tamper with a state field without recomputing the checksum.
    let path = store.state_path(&project);
    let raw = std::fs::read_to_string(&path).unwrap();
    let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    doc["state"]["iteration"] = serde_json::json!(42);
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let ctrl = controller(
        FlatDriver { tier1_passes: true, tier2_passing: 5 },
        store,
    );
    let config = loop_config(100, 100.0, 3, 3);

    let outcome = ctrl.run(&config, &CheckContext::new(&project)).await;

    assert_eq!(outcome.state, LoopState::Escalated);
    assert_eq!(outcome.escalation, Some(EscalationReason::CorruptState));
}

#[tokio::test]
async fn test_every_check_result_reaches_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let ctrl = controller(
        ImprovingDriver { calls: AtomicU32::new(0) },
        BudgetStore::new(dir.path().join("state")),
    );
    let config = loop_config(10, 100.0, 3, 3);

    let outcome = ctrl.run(&config, &CheckContext::new(dir.path())).await;
    assert_eq!(outcome.state, LoopState::Complete);

    // Two iterations, each emitting 1 blocker + 5 warning records.
    let records = ctrl.emitter().sink().records();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.project == "loop-test"));
}
