//! tiergate core library
//!
//! Domain model and infrastructure for the tiered validation
//! orchestrator: configuration composition, plugin loading, the checker
//! registry, durable budget state and metric emission.

pub mod budget;
pub mod checker;
pub mod config;
pub mod domain;
pub mod emit;
pub mod metrics;
pub mod obs;
pub mod plugin;
pub mod registry;
pub mod telemetry;

pub use domain::{
    BuiltinDimension, CheckOutcome, CheckResult, DimensionConfig, PluginError, Report, Result,
    Tier, TierResult, TiergateError,
};

pub use budget::{BudgetState, BudgetStore};
pub use checker::CommandChecker;
pub use config::{
    compose, default_global_path, json_merge_patch, project_config_path, BackpressureConfig,
    ConfigSource, RunConfig, ScoreWeights,
};
pub use emit::{MemorySink, MetricRecord, MetricSink, ReportEmitter, TracingSink};
pub use plugin::{load_plugins, parse_spec, PluginKind, PluginSpec};
pub use registry::{CheckContext, Checker, CheckerHandle, CheckerRegistry};

pub use metrics::COUNTERS;
pub use obs::{
    emit_loop_state, emit_run_blocked, emit_run_finished, emit_run_started, emit_tier_completed,
    RunSpan,
};
pub use telemetry::init_tracing;

/// tiergate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
