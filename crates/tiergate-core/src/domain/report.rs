//! Check results, per-tier aggregates and the run-level report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::dimension::Tier;

/// Raw verdict returned by a checker implementation.
///
/// Checkers report only what they observed; the orchestrator attaches
/// dimension, tier and timing when folding this into a [`CheckResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Whether the check passed.
    pub passed: bool,

    /// Human-readable summary line.
    pub message: String,

    /// Checker-specific structured detail.
    #[serde(default)]
    pub details: Value,

    /// Actionable fix hint, if the checker has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
}

impl CheckOutcome {
    /// A passing outcome with a message and no details.
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Value::Null,
            fix_suggestion: None,
        }
    }

    /// A failing outcome with a message and no details.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Value::Null,
            fix_suggestion: None,
        }
    }
}

/// Result of one checker invocation, produced exactly once per dimension
/// per run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Dimension that produced this result.
    pub dimension: String,

    /// Tier the dimension ran in.
    pub tier: Tier,

    /// Whether the check passed.
    pub passed: bool,

    /// Human-readable summary line.
    pub message: String,

    /// Checker-specific structured detail.
    pub details: Value,

    /// Wall-clock duration of the checker invocation.
    pub duration_ms: u64,

    /// Actionable fix hint, if the checker has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
}

impl CheckResult {
    /// Fold a checker outcome into a result.
    pub fn from_outcome(dimension: &str, tier: Tier, outcome: CheckOutcome, duration_ms: u64) -> Self {
        Self {
            dimension: dimension.to_string(),
            tier,
            passed: outcome.passed,
            message: outcome.message,
            details: outcome.details,
            duration_ms,
            fix_suggestion: outcome.fix_suggestion,
        }
    }

    /// Result for a checker that crashed, timed out or panicked.
    pub fn crashed(dimension: &str, tier: Tier, cause: &str, duration_ms: u64) -> Self {
        Self {
            dimension: dimension.to_string(),
            tier,
            passed: false,
            message: format!("{dimension} crashed: {cause}"),
            details: Value::Null,
            duration_ms,
            fix_suggestion: None,
        }
    }

    /// Whether this result came from the stub fallback checker.
    pub fn is_stub(&self) -> bool {
        self.details
            .as_object()
            .and_then(|o| o.get("stub"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Aggregate result of one tier within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierResult {
    /// Which tier this aggregates.
    pub tier: Tier,

    /// Per-dimension results, in completion order.
    pub results: Vec<CheckResult>,

    /// AND of all member results.
    pub passed: bool,

    /// Whether any member failed or was produced by the stub fallback.
    pub has_warnings: bool,
}

impl TierResult {
    /// Aggregate a tier from its member results.
    pub fn new(tier: Tier, results: Vec<CheckResult>) -> Self {
        let passed = results.iter().all(|r| r.passed);
        let has_warnings = results.iter().any(|r| !r.passed || r.is_stub());
        Self {
            tier,
            results,
            passed,
            has_warnings,
        }
    }

    /// Pass rate across members, in `[0, 1]`. An empty tier counts as 1.
    pub fn pass_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        let passed = self.results.iter().filter(|r| r.passed).count();
        passed as f64 / self.results.len() as f64
    }
}

/// Root aggregate for one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique run identifier.
    pub run_id: String,

    /// Project the run validated.
    pub project: String,

    /// Per-tier results. When `blocked` is true only Tier 1 is present.
    pub tiers: Vec<TierResult>,

    /// Whether a Tier 1 failure halted the run.
    pub blocked: bool,

    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// Start an empty report for a project.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            project: project.into(),
            tiers: Vec::new(),
            blocked: false,
            timestamp: Utc::now(),
        }
    }

    /// The result for a given tier, if that tier ran.
    pub fn tier(&self, tier: Tier) -> Option<&TierResult> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    /// Number of checks that passed across all tiers.
    pub fn passed_count(&self) -> usize {
        self.tiers
            .iter()
            .flat_map(|t| &t.results)
            .filter(|r| r.passed)
            .count()
    }

    /// Number of checks that failed across all tiers.
    pub fn failed_count(&self) -> usize {
        self.tiers
            .iter()
            .flat_map(|t| &t.results)
            .filter(|r| !r.passed)
            .count()
    }

    /// Whether every executed check passed.
    pub fn all_passed(&self) -> bool {
        !self.blocked && self.tiers.iter().all(|t| t.passed)
    }
}
