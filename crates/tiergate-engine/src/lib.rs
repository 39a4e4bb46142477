//! tiergate engine
//!
//! Runs validation dimensions in tier order with bounded parallelism,
//! scores the outcome, and drives the bounded retry loop:
//! - Tier 1 (blocker) gates Tiers 2/3; failures short-circuit the run
//! - checker crashes and timeouts are contained at the call boundary
//! - the iteration loop retries under budget circuit breakers until it
//!   converges, stalls, or is escalated to a human

pub mod controller;
pub mod orchestrator;
pub mod score;

// Re-export key types
pub use controller::{
    EscalationReason, FixRequester, IterationController, LoopOutcome, LoopState,
    TracingFixRequester, ValidationDriver,
};
pub use orchestrator::Orchestrator;
pub use score::combined_score;
