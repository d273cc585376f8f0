//! Pipeline driver: runs attempts and decides when they may finish.

use std::sync::Arc;

use tracing::info;

use super::attempt::BuildAttempt;
use super::state::CompilerState;
use super::BuildReport;
use crate::coordinator::{Dispatch, ValidationCoordinator};
use crate::domain::{Diagnostic, PipelineConfig, Result};

/// Drives build attempts for one pipeline.
pub struct BuildPipeline {
    config: PipelineConfig,
    state: Arc<CompilerState>,
    coordinator: ValidationCoordinator,
}

impl BuildPipeline {
    pub fn new(
        config: PipelineConfig,
        state: Arc<CompilerState>,
        coordinator: ValidationCoordinator,
    ) -> Self {
        Self {
            config,
            state,
            coordinator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<CompilerState> {
        &self.state
    }

    /// Begin a new attempt, superseding the previous one.
    pub fn begin(&self) -> BuildAttempt {
        let attempt = self.state.new_attempt();
        attempt.start();
        attempt
    }

    /// Run one attempt: record the main build's own diagnostics, hand type
    /// validation to the coordinator, then finish.
    ///
    /// If compiler options cannot be resolved the attempt is finished with the
    /// build diagnostics alone before the error is returned.
    pub async fn run_attempt(
        &self,
        build_diagnostics: Vec<Diagnostic>,
    ) -> Result<(BuildAttempt, Option<BuildReport>)> {
        let attempt = self.begin();
        attempt.extend_diagnostics(build_diagnostics);

        let dispatch = match self
            .coordinator
            .run_validation(&self.config, &self.state, &attempt)
            .await
        {
            Ok(dispatch) => dispatch,
            Err(err) => {
                // Consumers still get a Finished event for the attempt.
                attempt.finish();
                return Err(err);
            }
        };
        if let Dispatch::Submitted { job_digest } = &dispatch {
            info!(
                attempt = %attempt.id(),
                job = %&job_digest[..12.min(job_digest.len())],
                "type validation running in background"
            );
        }

        let report = self.complete(&attempt).await;
        Ok((attempt, report))
    }

    /// Finish `attempt` and return its report.
    ///
    /// Outside watch mode the attempt waits for outstanding validation, so its
    /// report includes the type diagnostics. In watch mode it finishes right
    /// away and late diagnostics arrive in a follow-up report.
    pub async fn complete(&self, attempt: &BuildAttempt) -> Option<BuildReport> {
        if !self.config.watch {
            attempt.wait_for_validation().await;
        }
        attempt.finish().or_else(|| attempt.report())
    }
}
