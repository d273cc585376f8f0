//! Merging a worker result back into the pipeline.

use super::guard::DispatchToken;
use crate::domain::{Diagnostic, ValidationResult};
use crate::metrics::METRICS;
use crate::obs::{self, ValidationSpan};
use crate::pipeline::{AttemptId, BuildAttempt, MergeOutcome};

/// What the reconciler did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// No diagnostics; the attempt is left as the pipeline concluded it.
    Clean,
    /// Diagnostics were appended to the still-open attempt, which then finished.
    MergedIntoOpen { diagnostics: usize },
    /// The attempt had finished; a new attempt reported the diagnostics.
    ReportedInNewAttempt { attempt: AttemptId, diagnostics: usize },
    /// The attempt had finished and was superseded; diagnostics were discarded.
    DroppedSuperseded { diagnostics: usize },
}

impl Reconciled {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconciled::Clean => "clean",
            Reconciled::MergedIntoOpen { .. } => "merged_into_open",
            Reconciled::ReportedInNewAttempt { .. } => "reported_in_new_attempt",
            Reconciled::DroppedSuperseded { .. } => "dropped_superseded",
        }
    }
}

/// Consume `result` for `attempt`. Runs once per job; the result is moved in.
pub(crate) fn reconcile(
    attempt: &BuildAttempt,
    token: DispatchToken,
    result: ValidationResult,
    span: ValidationSpan,
) -> Reconciled {
    span.finish(result.diagnostics.len());

    // Validation's own artifacts must survive any cleanup queued meanwhile.
    let deletions = attempt.compiler_state().deletions();
    deletions.cancel_delete_dirs(&result.dir_paths);
    deletions.cancel_delete_files(&result.file_paths);

    // Nothing is left to wait on, whichever branch follows.
    attempt.release_pending(token);

    let outcome = if result.diagnostics.is_empty() {
        Reconciled::Clean
    } else {
        let count = result.diagnostics.len();
        match attempt.merge_and_finish(result.diagnostics) {
            MergeOutcome::Merged(_) => {
                METRICS.add_diagnostics_reported(count as u64);
                Reconciled::MergedIntoOpen { diagnostics: count }
            }
            MergeOutcome::AlreadyFinished(diagnostics) => report_late(attempt, diagnostics),
        }
    };

    METRICS.inc_results_reconciled();
    obs::emit_validation_reconciled(attempt.id(), &outcome);
    outcome
}

fn report_late(attempt: &BuildAttempt, diagnostics: Vec<Diagnostic>) -> Reconciled {
    let count = diagnostics.len();
    if !attempt.is_active() {
        METRICS.inc_results_dropped();
        obs::emit_diagnostics_dropped(attempt.id(), count);
        return Reconciled::DroppedSuperseded { diagnostics: count };
    }

    attempt.debug("validation finished after the build; reporting in a new attempt");
    let follow_up = attempt.compiler_state().new_attempt();
    follow_up.start();
    follow_up.extend_diagnostics(diagnostics);
    follow_up.finish();
    METRICS.add_diagnostics_reported(count as u64);

    Reconciled::ReportedInNewAttempt {
        attempt: follow_up.id(),
        diagnostics: count,
    }
}
