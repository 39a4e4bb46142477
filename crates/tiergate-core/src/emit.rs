//! Best-effort metric emission for external dashboards.
//!
//! Each [`crate::domain::CheckResult`] is flattened into one
//! [`MetricRecord`] and published through a backend-agnostic
//! [`MetricSink`]. Emission never blocks or fails the run: sink errors
//! are swallowed and logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Report, Tier, TiergateError};

/// Flat record suitable for a time-series sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Project the check ran against.
    pub project: String,

    /// Dimension name.
    pub dimension: String,

    /// Severity tier.
    pub tier: Tier,

    /// Whether the check passed.
    pub passed: bool,

    /// Checker duration.
    pub duration_ms: u64,

    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

/// Publish capability for one metric record.
///
/// Backends (time-series stores, dashboards) live behind this trait; the
/// core never knows which one it is talking to.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Publish one record.
    async fn publish(&self, record: &MetricRecord) -> Result<(), TiergateError>;
}

/// Sink that logs each record as a structured `info!` event.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl MetricSink for TracingSink {
    async fn publish(&self, record: &MetricRecord) -> Result<(), TiergateError> {
        info!(
            event = "metric.check_result",
            project = %record.project,
            dimension = %record.dimension,
            tier = %record.tier,
            passed = record.passed,
            duration_ms = record.duration_ms,
        );
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn publish(&self, record: &MetricRecord) -> Result<(), TiergateError> {
        self.records
            .lock()
            .expect("sink mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}

/// Converts reports to metric records and publishes them.
pub struct ReportEmitter<S: MetricSink> {
    sink: S,
}

impl<S: MetricSink> ReportEmitter<S> {
    /// Emitter over a sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Borrow the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Emit one record per check result in the report. Best-effort: a
    /// failing sink produces warnings, never an error.
    pub async fn emit(&self, report: &Report) {
        for tier in &report.tiers {
            for result in &tier.results {
                let record = MetricRecord {
                    project: report.project.clone(),
                    dimension: result.dimension.clone(),
                    tier: result.tier,
                    passed: result.passed,
                    duration_ms: result.duration_ms,
                    recorded_at: Utc::now(),
                };
                if let Err(e) = self.sink.publish(&record).await {
                    warn!(
                        dimension = %record.dimension,
                        error = %e,
                        "metric publish failed, dropping record"
                    );
                }
            }
        }
    }
}
