//! Out-of-band type validation coordinator.
//!
//! Provides:
//! - Eligibility checks and job assembly (`dispatch`)
//! - Reconciliation of worker results against the build lifecycle (`reconcile`)
//! - Pending-job bookkeeping shared by both (`guard`)
//!
//! [`ValidationCoordinator::run_validation`] returns as soon as the job is
//! submitted. The worker result is reconciled later on a spawned task, which
//! may run before or after the owning attempt has finished.

pub mod dispatch;
pub mod guard;
pub mod reconcile;

use std::sync::Arc;

use tracing::Instrument;

use crate::domain::{PipelineConfig, Result};
use crate::metrics::METRICS;
use crate::obs::{self, ValidationSpan};
use crate::pipeline::{BuildAttempt, CompilerState};
use crate::services::{CompilerOptionsResolver, ValidationService};

pub use dispatch::SkipReason;
pub use guard::{PendingValidation, SettleSignal};
pub use reconcile::Reconciled;

/// What [`ValidationCoordinator::run_validation`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The attempt was not eligible; nothing was submitted.
    Skipped(SkipReason),
    /// A job was submitted and its reconciler is registered.
    Submitted { job_digest: String },
}

/// Decides whether to validate, dispatches to the worker service and
/// registers the reconciler for the result.
#[derive(Clone)]
pub struct ValidationCoordinator {
    resolver: Arc<dyn CompilerOptionsResolver>,
    service: Arc<dyn ValidationService>,
}

impl ValidationCoordinator {
    pub fn new(
        resolver: Arc<dyn CompilerOptionsResolver>,
        service: Arc<dyn ValidationService>,
    ) -> Self {
        Self { resolver, service }
    }

    /// Dispatch type validation for `attempt`.
    ///
    /// Must be called from within a tokio runtime. Options-resolution failure
    /// is returned to the caller; nothing is submitted in that case.
    pub async fn run_validation(
        &self,
        config: &PipelineConfig,
        state: &Arc<CompilerState>,
        attempt: &BuildAttempt,
    ) -> Result<Dispatch> {
        if let Some(reason) = dispatch::check_eligibility(attempt) {
            return Ok(skip(attempt, reason));
        }

        // Reserve the slot before the first suspension point so overlapping
        // calls on the same attempt cannot both submit.
        let (pending, settle) = guard::pending_pair();
        let token = settle.token();
        if !attempt.reserve_pending(pending) {
            return Ok(skip(attempt, SkipReason::AlreadyPending));
        }

        let span = ValidationSpan::start(attempt.id());
        let job = match dispatch::assemble_job(config, state, self.resolver.as_ref()).await {
            Ok(job) => job,
            Err(err) => {
                attempt.release_pending(token);
                return Err(err.into());
            }
        };
        let job_digest = job.digest();
        attempt.record_pending_digest(token, job_digest.clone());
        obs::emit_validation_dispatched(attempt.id(), &job_digest, &job);

        let ticket = self.service.submit(job);

        let owner = attempt.clone();
        let task_span = tracing::info_span!("offcheck.validation", attempt = %attempt.id());
        tokio::spawn(
            async move {
                // Released on every exit path, after the attempt is updated.
                let _settle = settle;
                match ticket.await {
                    Ok(result) => {
                        reconcile::reconcile(&owner, token, result, span);
                    }
                    Err(err) => {
                        span.abandon();
                        owner.release_pending(token);
                        METRICS.inc_worker_failures();
                        obs::emit_validation_failed(owner.id(), &err);
                    }
                }
            }
            .instrument(task_span),
        );

        METRICS.inc_jobs_dispatched();
        Ok(Dispatch::Submitted { job_digest })
    }
}

fn skip(attempt: &BuildAttempt, reason: SkipReason) -> Dispatch {
    attempt.debug(&format!("type validation skipped: {}", reason.as_str()));
    METRICS.inc_jobs_skipped();
    obs::emit_validation_skipped(attempt.id(), reason);
    Dispatch::Skipped(reason)
}
