//! Convergence score for the iteration loop.
//!
//! The score folds Tier 2 and Tier 3 pass rates into a single number in
//! `[0, 100]` using configurable weights:
//!
//! `score = 100 * (w2 * rate2 + w3 * rate3) / (w2 + w3)`
//!
//! Tier 1 does not participate — the score is only computed once Tier 1
//! has passed. A tier that did not run (or ran no dimensions) counts as
//! a full pass, so a report with no Tier 2/3 dimensions scores 100.

use tiergate_core::{Report, ScoreWeights, Tier};

/// Compute the combined convergence score for a report.
pub fn combined_score(report: &Report, weights: &ScoreWeights) -> f64 {
    let w2 = weights.tier2_weight.max(0.0);
    let w3 = weights.tier3_weight.max(0.0);
    let denom = w2 + w3;
    if denom <= 0.0 {
        return 100.0;
    }

    let rate2 = report.tier(Tier::Warning).map_or(1.0, |t| t.pass_rate());
    let rate3 = report.tier(Tier::Monitor).map_or(1.0, |t| t.pass_rate());

    (100.0 * (w2 * rate2 + w3 * rate3) / denom).clamp(0.0, 100.0)
}
