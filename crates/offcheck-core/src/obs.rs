//! Structured observability hooks for the validation lifecycle.
//!
//! This module provides:
//! - `ValidationSpan`: the timer started at dispatch and stopped by the reconciler
//! - Emission functions for dispatch, skip, reconcile, drop and worker failure
//!
//! Filter with `OFFCHECK_LOG` or `RUST_LOG` (see [`crate::telemetry`]).

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::coordinator::{Reconciled, SkipReason};
use crate::domain::{ValidationJob, WorkerError};
use crate::pipeline::{AttemptId, BuildReport};

/// Wall-clock measurement of one validation job.
///
/// Observability only; dropping it unfinished records nothing.
#[derive(Debug)]
pub struct ValidationSpan {
    attempt: AttemptId,
    started: Instant,
}

impl ValidationSpan {
    pub fn start(attempt: AttemptId) -> Self {
        debug!(event = "validation.started", attempt = %attempt);
        Self {
            attempt,
            started: Instant::now(),
        }
    }

    /// Stop the timer once a result has arrived.
    pub fn finish(self, diagnostics: usize) -> Duration {
        let elapsed = self.started.elapsed();
        info!(
            event = "validation.finished",
            attempt = %self.attempt,
            duration_ms = elapsed.as_millis() as u64,
            diagnostics = diagnostics,
        );
        elapsed
    }

    /// Stop the timer when no result will arrive.
    pub fn abandon(self) -> Duration {
        let elapsed = self.started.elapsed();
        debug!(
            event = "validation.abandoned",
            attempt = %self.attempt,
            duration_ms = elapsed.as_millis() as u64,
        );
        elapsed
    }
}

/// Emit event: attempt was not eligible for validation (debug level).
pub fn emit_validation_skipped(attempt: AttemptId, reason: SkipReason) {
    debug!(event = "validation.skipped", attempt = %attempt, reason = reason.as_str());
}

/// Emit event: job handed to the worker service.
pub fn emit_validation_dispatched(attempt: AttemptId, job_digest: &str, job: &ValidationJob) {
    info!(
        event = "validation.dispatched",
        attempt = %attempt,
        job = %&job_digest[..12.min(job_digest.len())],
        root_files = job.root_files.len(),
        emit_declarations = job.emit_declarations,
    );
}

/// Emit event: worker result merged back into the pipeline.
pub fn emit_validation_reconciled(attempt: AttemptId, outcome: &Reconciled) {
    info!(event = "validation.reconciled", attempt = %attempt, outcome = outcome.as_str());
}

/// Emit event: late diagnostics for a superseded attempt were discarded.
pub fn emit_diagnostics_dropped(attempt: AttemptId, count: usize) {
    debug!(event = "validation.dropped", attempt = %attempt, diagnostics = count);
}

/// Emit event: worker delivered no result (warning level).
pub fn emit_validation_failed(attempt: AttemptId, error: &WorkerError) {
    warn!(event = "validation.failed", attempt = %attempt, error = %error);
}

/// Emit event: an attempt finished.
pub fn emit_attempt_finished(report: &BuildReport) {
    info!(
        event = "attempt.finished",
        attempt = %report.attempt,
        diagnostics = report.diagnostics.len(),
        has_error = report.has_error,
        duration_ms = report.duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_finish_reports_elapsed() {
        let span = ValidationSpan::start(AttemptId(1));
        let elapsed = span.finish(0);
        assert!(elapsed < Duration::from_secs(5));
    }
}
