//! Eligibility checks and job assembly.

use crate::domain::{collect_root_files, OptionsError, PipelineConfig, ValidationJob};
use crate::pipeline::{BuildAttempt, CompilerState};
use crate::services::CompilerOptionsResolver;

/// Why an attempt does not get a validation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A newer attempt has superseded this one.
    NotActive,
    /// The build already failed for other reasons.
    HasError,
    /// A job for this attempt is already in flight.
    AlreadyPending,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotActive => "not_active",
            SkipReason::HasError => "has_error",
            SkipReason::AlreadyPending => "already_pending",
        }
    }
}

/// Short-circuit policy, evaluated in order.
pub(crate) fn check_eligibility(attempt: &BuildAttempt) -> Option<SkipReason> {
    if !attempt.is_active() {
        return Some(SkipReason::NotActive);
    }
    if attempt.has_error() {
        return Some(SkipReason::HasError);
    }
    if attempt.is_validation_pending() {
        return Some(SkipReason::AlreadyPending);
    }
    None
}

/// Assemble the job for the current pipeline state.
///
/// The only suspension point is options resolution; its failure propagates.
pub(crate) async fn assemble_job(
    config: &PipelineConfig,
    state: &CompilerState,
    resolver: &dyn CompilerOptionsResolver,
) -> Result<ValidationJob, OptionsError> {
    let root_files = collect_root_files(&state.root_files(), &config.declarations_index_path());
    let collection_names = state.collection_names();
    let compiler_options = resolver.resolve(config, state).await?;

    Ok(ValidationJob {
        compiler_options,
        root_files,
        emit_declarations: config.emits_declarations(),
        collection_names,
        cwd: config.cwd.clone(),
    })
}
