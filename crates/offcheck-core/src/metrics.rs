//! Global atomic counters for the validation lifecycle.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI run ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    jobs_dispatched: AtomicU64,
    jobs_skipped: AtomicU64,
    results_reconciled: AtomicU64,
    diagnostics_reported: AtomicU64,
    results_dropped: AtomicU64,
    worker_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub jobs_dispatched: u64,
    pub jobs_skipped: u64,
    pub results_reconciled: u64,
    pub diagnostics_reported: u64,
    pub results_dropped: u64,
    pub worker_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_dispatched: AtomicU64::new(0),
            jobs_skipped: AtomicU64::new(0),
            results_reconciled: AtomicU64::new(0),
            diagnostics_reported: AtomicU64::new(0),
            results_dropped: AtomicU64::new(0),
            worker_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_jobs_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_dispatched", "counter incremented");
    }

    pub fn inc_jobs_skipped(&self) {
        self.jobs_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_skipped", "counter incremented");
    }

    pub fn inc_results_reconciled(&self) {
        self.results_reconciled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "results_reconciled", "counter incremented");
    }

    /// Add `n` diagnostics that reached a report.
    pub fn add_diagnostics_reported(&self, n: u64) {
        self.diagnostics_reported.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "diagnostics_reported", n, "counter incremented");
    }

    pub fn inc_results_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "results_dropped", "counter incremented");
    }

    pub fn inc_worker_failures(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "worker_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_skipped: self.jobs_skipped.load(Ordering::Relaxed),
            results_reconciled: self.results_reconciled.load(Ordering::Relaxed),
            diagnostics_reported: self.diagnostics_reported.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            jobs_dispatched = s.jobs_dispatched,
            jobs_skipped = s.jobs_skipped,
            results_reconciled = s.results_reconciled,
            diagnostics_reported = s.diagnostics_reported,
            results_dropped = s.results_dropped,
            worker_failures = s.worker_failures,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.jobs_dispatched.store(0, Ordering::Relaxed);
        self.jobs_skipped.store(0, Ordering::Relaxed);
        self.results_reconciled.store(0, Ordering::Relaxed);
        self.diagnostics_reported.store(0, Ordering::Relaxed);
        self.results_dropped.store(0, Ordering::Relaxed);
        self.worker_failures.store(0, Ordering::Relaxed);
    }
}
