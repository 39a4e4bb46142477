//! Global atomic counters for tiergate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Counters::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a loop).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counters singleton.
pub static COUNTERS: Counters = Counters::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Counters {
    checks_executed: AtomicU64,
    runs_blocked: AtomicU64,
    fix_requests: AtomicU64,
    escalations: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            checks_executed: AtomicU64::new(0),
            runs_blocked: AtomicU64::new(0),
            fix_requests: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
        }
    }

    /// Increment the checks-executed counter by one.
    pub fn inc_checks_executed(&self) {
        self.checks_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the runs-blocked counter by one.
    pub fn inc_runs_blocked(&self) {
        self.runs_blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the fix-requests counter by one.
    pub fn inc_fix_requests(&self) {
        self.fix_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the escalations counter by one.
    pub fn inc_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a loop, CLI exit) rather
    /// than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            checks_executed = self.checks_executed(),
            runs_blocked = self.runs_blocked(),
            fix_requests = self.fix_requests(),
            escalations = self.escalations(),
        );
    }

    /// Read the current checks-executed count.
    pub fn checks_executed(&self) -> u64 {
        self.checks_executed.load(Ordering::Relaxed)
    }

    /// Read the current runs-blocked count.
    pub fn runs_blocked(&self) -> u64 {
        self.runs_blocked.load(Ordering::Relaxed)
    }

    /// Read the current fix-requests count.
    pub fn fix_requests(&self) -> u64 {
        self.fix_requests.load(Ordering::Relaxed)
    }

    /// Read the current escalations count.
    pub fn escalations(&self) -> u64 {
        self.escalations.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.checks_executed.store(0, Ordering::Relaxed);
        self.runs_blocked.store(0, Ordering::Relaxed);
        self.fix_requests.store(0, Ordering::Relaxed);
        self.escalations.store(0, Ordering::Relaxed);
    }
}
