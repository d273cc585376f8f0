//! Build attempts and their lifecycle state machine.
//!
//! An attempt moves `Created -> Open -> Finished`; `finish` takes effect
//! exactly once. Whether an attempt is still the active one is owned by
//! [`CompilerState`], so superseding never writes to the attempt itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::CompilerState;
use super::{AttemptId, BuildEvent, BuildReport};
use crate::coordinator::guard::{DispatchToken, PendingValidation};
use crate::domain::Diagnostic;
use crate::obs;

/// Lifecycle phase of a [`BuildAttempt`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    Open,
    Finished,
}

/// Outcome of [`BuildAttempt::merge_and_finish`].
#[derive(Debug)]
pub enum MergeOutcome {
    /// The attempt was still open; diagnostics were appended and it finished.
    Merged(BuildReport),
    /// The attempt had already finished; diagnostics are handed back untouched.
    AlreadyFinished(Vec<Diagnostic>),
}

#[derive(Debug)]
struct AttemptRecord {
    phase: Phase,
    diagnostics: Vec<Diagnostic>,
    pending: Option<PendingValidation>,
    started_at: Option<Instant>,
    report: Option<BuildReport>,
}

struct AttemptInner {
    id: AttemptId,
    state: Arc<CompilerState>,
    record: Mutex<AttemptRecord>,
}

/// Handle to one pass of the build pipeline.
///
/// Cheap to clone; every clone observes the same record. The pipeline driver
/// is the single writer of lifecycle transitions, the reconciler reads and
/// appends through the same handle.
#[derive(Clone)]
pub struct BuildAttempt {
    inner: Arc<AttemptInner>,
}

impl std::fmt::Debug for BuildAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.lock();
        f.debug_struct("BuildAttempt")
            .field("id", &self.inner.id)
            .field("phase", &record.phase)
            .field("diagnostics", &record.diagnostics.len())
            .field("pending", &record.pending.is_some())
            .finish()
    }
}

impl BuildAttempt {
    pub(crate) fn new(id: AttemptId, state: Arc<CompilerState>) -> Self {
        Self {
            inner: Arc::new(AttemptInner {
                id,
                state,
                record: Mutex::new(AttemptRecord {
                    phase: Phase::Created,
                    diagnostics: Vec::new(),
                    pending: None,
                    started_at: None,
                    report: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AttemptRecord> {
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> AttemptId {
        self.inner.id
    }

    /// Pipeline state this attempt belongs to.
    pub fn compiler_state(&self) -> &Arc<CompilerState> {
        &self.inner.state
    }

    /// True while no newer attempt has been created.
    pub fn is_active(&self) -> bool {
        self.inner.state.active_attempt_id() == self.inner.id
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn has_finished(&self) -> bool {
        self.phase() == Phase::Finished
    }

    /// True once any error-level diagnostic has been recorded.
    pub fn has_error(&self) -> bool {
        self.lock().diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Snapshot of the recorded diagnostics, in append order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().diagnostics.clone()
    }

    pub fn push_diagnostic(&self, diagnostic: Diagnostic) {
        self.lock().diagnostics.push(diagnostic);
    }

    pub fn extend_diagnostics(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.lock().diagnostics.extend(diagnostics);
    }

    /// Trace sink scoped to this attempt.
    pub fn debug(&self, message: &str) {
        debug!(attempt = %self.inner.id, "{}", message);
    }

    /// `Created -> Open`. Returns `false` if the attempt was already started.
    pub fn start(&self) -> bool {
        {
            let mut record = self.lock();
            if record.phase != Phase::Created {
                return false;
            }
            record.phase = Phase::Open;
            record.started_at = Some(Instant::now());
        }
        self.inner.state.publish(BuildEvent::Started(self.inner.id));
        self.debug("build attempt started");
        true
    }

    /// Finalize the attempt. Only the first call has an effect and returns
    /// the published report.
    pub fn finish(&self) -> Option<BuildReport> {
        let report = {
            let mut record = self.lock();
            self.finish_locked(&mut record)?
        };
        self.publish_finished(&report);
        Some(report)
    }

    /// The report published when the attempt finished, whoever finished it.
    pub fn report(&self) -> Option<BuildReport> {
        self.lock().report.clone()
    }

    /// Append late diagnostics and finish, as one step, unless the attempt
    /// has already finished.
    pub fn merge_and_finish(&self, diagnostics: Vec<Diagnostic>) -> MergeOutcome {
        let report = {
            let mut record = self.lock();
            if record.phase == Phase::Finished {
                return MergeOutcome::AlreadyFinished(diagnostics);
            }
            record.diagnostics.extend(diagnostics);
            self.close_locked(&mut record)
        };
        self.publish_finished(&report);
        MergeOutcome::Merged(report)
    }

    fn finish_locked(&self, record: &mut AttemptRecord) -> Option<BuildReport> {
        if record.phase == Phase::Finished {
            return None;
        }
        Some(self.close_locked(record))
    }

    fn close_locked(&self, record: &mut AttemptRecord) -> BuildReport {
        let started_at = *record.started_at.get_or_insert_with(Instant::now);
        record.phase = Phase::Finished;
        let report = BuildReport {
            attempt: self.inner.id,
            has_error: record.diagnostics.iter().any(Diagnostic::is_error),
            diagnostics: record.diagnostics.clone(),
            duration_ms: started_at.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        };
        record.report = Some(report.clone());
        report
    }

    fn publish_finished(&self, report: &BuildReport) {
        obs::emit_attempt_finished(report);
        self.inner
            .state
            .publish(BuildEvent::Finished(report.clone()));
    }

    /// Whether a validation job is still outstanding for this attempt.
    pub fn is_validation_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Digest of the outstanding validation job, if any.
    pub fn pending_job_digest(&self) -> Option<String> {
        self.lock()
            .pending
            .as_ref()
            .and_then(|p| p.job_digest().map(str::to_string))
    }

    /// Wait until the outstanding validation job (if any) has been reconciled.
    pub async fn wait_for_validation(&self) {
        let signal = self.lock().pending.as_ref().map(PendingValidation::signal);
        if let Some(signal) = signal {
            signal.settled().await;
        }
    }

    /// Install `pending` unless a job is already outstanding.
    pub(crate) fn reserve_pending(&self, pending: PendingValidation) -> bool {
        let mut record = self.lock();
        if record.pending.is_some() {
            return false;
        }
        record.pending = Some(pending);
        true
    }

    pub(crate) fn record_pending_digest(&self, token: DispatchToken, digest: String) {
        if let Some(pending) = self.lock().pending.as_mut() {
            if pending.token() == token {
                pending.set_job_digest(digest);
            }
        }
    }

    /// Clear the pending record if it still belongs to `token`.
    pub(crate) fn release_pending(&self, token: DispatchToken) -> Option<PendingValidation> {
        let mut record = self.lock();
        let owned = record.pending.as_ref().is_some_and(|p| p.token() == token);
        if owned {
            record.pending.take()
        } else {
            None
        }
    }
}
