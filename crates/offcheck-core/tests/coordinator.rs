//! End-to-end behaviour of the validation coordinator against in-memory
//! collaborators: eligibility, reconciliation paths, and the pipeline driver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use offcheck_core::fakes::{
    CancelKind, FailingOptionsResolver, FixedOptionsResolver, ImmediateValidationService,
    ManualValidationService, RecordingDeletionScheduler,
};
use offcheck_core::{
    BuildAttempt, BuildEvent, BuildPipeline, BuildReport, CompilerOptions, CompilerState,
    CoordinatorError, Diagnostic, Dispatch, OutputTarget, Phase, PipelineConfig, SkipReason,
    ValidationCoordinator, ValidationResult, WorkerError,
};
use tokio::sync::broadcast;

struct Harness {
    config: PipelineConfig,
    state: Arc<CompilerState>,
    deletions: Arc<RecordingDeletionScheduler>,
    service: Arc<ManualValidationService>,
    coordinator: ValidationCoordinator,
}

fn config() -> PipelineConfig {
    PipelineConfig {
        cwd: PathBuf::from("/work"),
        output_targets: vec![OutputTarget {
            kind: "dist".to_string(),
            dir: PathBuf::from("dist"),
            types_dir: Some(PathBuf::from("dist/types")),
        }],
        ..PipelineConfig::default()
    }
}

fn harness() -> Harness {
    let deletions = Arc::new(RecordingDeletionScheduler::new());
    let state = Arc::new(CompilerState::new(deletions.clone()));
    state.set_root_files(vec![PathBuf::from("/work/src/app.tsx")]);
    let service = Arc::new(ManualValidationService::new());
    let coordinator = ValidationCoordinator::new(
        Arc::new(FixedOptionsResolver::new(CompilerOptions::new())),
        service.clone(),
    );
    Harness {
        config: config(),
        state,
        deletions,
        service,
        coordinator,
    }
}

impl Harness {
    fn open_attempt(&self) -> BuildAttempt {
        let attempt = self.state.new_attempt();
        attempt.start();
        attempt
    }

    async fn dispatch(&self, attempt: &BuildAttempt) -> Dispatch {
        self.coordinator
            .run_validation(&self.config, &self.state, attempt)
            .await
            .expect("run_validation")
    }
}

fn errors(messages: &[&str]) -> Vec<Diagnostic> {
    messages.iter().map(|m| Diagnostic::error(*m)).collect()
}

fn finished_reports(rx: &mut broadcast::Receiver<BuildEvent>) -> Vec<BuildReport> {
    let mut reports = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BuildEvent::Finished(report) = event {
            reports.push(report);
        }
    }
    reports
}

async fn settle(attempt: &BuildAttempt) {
    tokio::time::timeout(Duration::from_secs(5), attempt.wait_for_validation())
        .await
        .expect("validation settled");
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[tokio::test]
async fn superseded_attempt_is_not_validated() {
    let h = harness();
    let old = h.open_attempt();
    old.push_diagnostic(Diagnostic::warning("unused import"));
    let _newer = h.open_attempt();

    assert_eq!(h.dispatch(&old).await, Dispatch::Skipped(SkipReason::NotActive));
    assert_eq!(h.service.job_count(), 0);
    assert!(!old.is_validation_pending());
    assert_eq!(old.diagnostics(), vec![Diagnostic::warning("unused import")]);
    assert_eq!(old.phase(), Phase::Open);
}

#[tokio::test]
async fn errored_attempt_is_not_validated() {
    let h = harness();
    let attempt = h.open_attempt();
    attempt.push_diagnostic(Diagnostic::error("syntax error"));

    assert_eq!(h.dispatch(&attempt).await, Dispatch::Skipped(SkipReason::HasError));
    assert_eq!(h.service.job_count(), 0);
}

#[tokio::test]
async fn second_dispatch_while_pending_is_skipped() {
    let h = harness();
    let attempt = h.open_attempt();

    assert!(matches!(h.dispatch(&attempt).await, Dispatch::Submitted { .. }));
    assert_eq!(
        h.dispatch(&attempt).await,
        Dispatch::Skipped(SkipReason::AlreadyPending)
    );
    assert_eq!(h.service.job_count(), 1);
}

#[tokio::test]
async fn overlapping_dispatches_submit_one_job() {
    let h = harness();
    let coordinator = ValidationCoordinator::new(
        Arc::new(FixedOptionsResolver::new(CompilerOptions::new()).yielding()),
        h.service.clone(),
    );
    let attempt = h.open_attempt();

    let (first, second) = tokio::join!(
        coordinator.run_validation(&h.config, &h.state, &attempt),
        coordinator.run_validation(&h.config, &h.state, &attempt),
    );
    let mut outcomes = vec![first.expect("first"), second.expect("second")];
    outcomes.sort_by_key(|d| matches!(d, Dispatch::Skipped(_)));
    assert!(matches!(outcomes[0], Dispatch::Submitted { .. }));
    assert_eq!(outcomes[1], Dispatch::Skipped(SkipReason::AlreadyPending));
    assert_eq!(h.service.job_count(), 1);
    assert!(attempt.is_validation_pending());

    h.service.complete(0, ValidationResult::default());
    settle(&attempt).await;
    assert!(!attempt.is_validation_pending());
}

#[tokio::test]
async fn job_carries_declarations_index_exactly_once() {
    let h = harness();
    let index = PathBuf::from("/work/src/components.d.ts");
    h.state
        .set_root_files(vec![PathBuf::from("/work/src/app.tsx"), index.clone()]);
    h.state.add_collection("@stencil/router".to_string());
    let attempt = h.open_attempt();

    let dispatch = h.dispatch(&attempt).await;
    let jobs = h.service.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.root_files.iter().filter(|p| **p == index).count(), 1);
    assert!(job.emit_declarations);
    assert_eq!(job.collection_names, vec!["@stencil/router".to_string()]);
    assert_eq!(
        dispatch,
        Dispatch::Submitted {
            job_digest: job.digest()
        }
    );
    assert_eq!(attempt.pending_job_digest(), Some(job.digest()));
}

#[tokio::test]
async fn options_failure_propagates_without_submitting() {
    let h = harness();
    let coordinator =
        ValidationCoordinator::new(Arc::new(FailingOptionsResolver), h.service.clone());
    let attempt = h.open_attempt();

    let err = coordinator
        .run_validation(&h.config, &h.state, &attempt)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Options(_)));
    assert_eq!(h.service.job_count(), 0);
    assert!(!attempt.is_validation_pending());
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_result_clears_pending_and_leaves_attempt_open() {
    let h = harness();
    let mut events = h.state.subscribe();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;

    assert!(h.service.complete(0, ValidationResult::default()));
    settle(&attempt).await;

    assert!(!attempt.is_validation_pending());
    assert_eq!(attempt.phase(), Phase::Open);
    assert_eq!(h.state.active_attempt_id(), attempt.id());
    assert!(finished_reports(&mut events).is_empty());
}

#[tokio::test]
async fn diagnostics_merge_into_open_attempt_in_order() {
    let h = harness();
    let mut events = h.state.subscribe();
    let attempt = h.open_attempt();
    attempt.push_diagnostic(Diagnostic::warning("unused variable"));
    h.dispatch(&attempt).await;

    h.service
        .complete(0, ValidationResult::with_diagnostics(errors(&["a", "b"])));
    settle(&attempt).await;

    let messages: Vec<String> = attempt
        .diagnostics()
        .into_iter()
        .map(|d| d.message)
        .collect();
    assert_eq!(messages, vec!["unused variable", "a", "b"]);
    assert!(attempt.has_finished());
    assert!(attempt.has_error());
    assert!(attempt.finish().is_none());

    let reports = finished_reports(&mut events);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].attempt, attempt.id());
    assert_eq!(reports[0].error_count(), 2);
}

#[tokio::test]
async fn late_diagnostics_for_active_attempt_get_a_new_report() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;
    attempt.finish();
    let mut events = h.state.subscribe();

    h.service
        .complete(0, ValidationResult::with_diagnostics(errors(&["late"])));
    settle(&attempt).await;

    assert!(attempt.diagnostics().is_empty());
    assert_ne!(h.state.active_attempt_id(), attempt.id());

    let reports = finished_reports(&mut events);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].attempt, h.state.active_attempt_id());
    assert_eq!(reports[0].diagnostics, errors(&["late"]));
    assert!(reports[0].has_error);
}

#[tokio::test]
async fn late_diagnostics_for_superseded_attempt_are_dropped() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;
    attempt.finish();
    let newer = h.open_attempt();
    let mut events = h.state.subscribe();

    h.service
        .complete(0, ValidationResult::with_diagnostics(errors(&["stale"])));
    settle(&attempt).await;

    assert!(!attempt.is_validation_pending());
    assert_eq!(h.state.active_attempt_id(), newer.id());
    assert!(newer.diagnostics().is_empty());
    assert!(finished_reports(&mut events).is_empty());
}

#[tokio::test]
async fn validation_outputs_are_protected_from_cleanup() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;

    let mut result = ValidationResult::default();
    result.dir_paths.insert(PathBuf::from("/work/dist/types"));
    result
        .file_paths
        .insert(PathBuf::from("/work/dist/types/app.d.ts"));
    h.service.complete(0, result.clone());
    settle(&attempt).await;

    let calls = h.deletions.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].kind, CancelKind::Dirs);
    assert_eq!(calls[0].paths, result.dir_paths);
    assert_eq!(calls[1].kind, CancelKind::Files);
    assert_eq!(calls[1].paths, result.file_paths);
}

#[tokio::test]
async fn result_is_reconciled_at_most_once() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;

    assert!(h
        .service
        .complete(0, ValidationResult::with_diagnostics(errors(&["x"]))));
    assert!(!h
        .service
        .complete(0, ValidationResult::with_diagnostics(errors(&["y"]))));
    settle(&attempt).await;

    assert_eq!(attempt.diagnostics(), errors(&["x"]));
    assert_eq!(h.deletions.calls().len(), 2);
}

#[tokio::test]
async fn worker_failure_clears_pending_without_touching_attempt() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;

    h.service.fail(0, WorkerError::TimedOut { secs: 300 });
    settle(&attempt).await;

    assert!(!attempt.is_validation_pending());
    assert_eq!(attempt.phase(), Phase::Open);
    assert!(attempt.diagnostics().is_empty());
    assert!(h.deletions.calls().is_empty());
}

#[tokio::test]
async fn abandoned_job_releases_waiters() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;

    assert!(h.service.abandon(0));
    settle(&attempt).await;
    assert!(!attempt.is_validation_pending());
}

#[tokio::test]
async fn new_dispatch_allowed_after_settle() {
    let h = harness();
    let attempt = h.open_attempt();
    h.dispatch(&attempt).await;
    h.service.complete(0, ValidationResult::default());
    settle(&attempt).await;

    assert!(matches!(h.dispatch(&attempt).await, Dispatch::Submitted { .. }));
    assert_eq!(h.service.job_count(), 2);
}

// ---------------------------------------------------------------------------
// Pipeline driver
// ---------------------------------------------------------------------------

async fn wait_for_jobs(service: &ManualValidationService, n: usize) {
    for _ in 0..500 {
        if service.job_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {n} submitted jobs, saw {}", service.job_count());
}

#[tokio::test]
async fn driver_waits_for_validation_outside_watch_mode() {
    let h = harness();
    let pipeline = Arc::new(BuildPipeline::new(
        h.config.clone(),
        h.state.clone(),
        h.coordinator.clone(),
    ));

    let run = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_attempt(Vec::new()).await }
    });
    wait_for_jobs(&h.service, 1).await;
    assert!(!run.is_finished());

    h.service
        .complete(0, ValidationResult::with_diagnostics(errors(&["TS2322"])));
    let (attempt, report) = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("driver finished")
        .expect("join")
        .expect("run_attempt");

    let report = report.expect("report");
    assert_eq!(report.attempt, attempt.id());
    assert_eq!(report.diagnostics, errors(&["TS2322"]));
    assert!(report.has_error);
}

#[tokio::test]
async fn driver_finishes_immediately_in_watch_mode() {
    let h = harness();
    let mut events = h.state.subscribe();
    let config = PipelineConfig {
        watch: true,
        ..h.config.clone()
    };
    let pipeline = BuildPipeline::new(config, h.state.clone(), h.coordinator.clone());

    let (attempt, report) = pipeline.run_attempt(Vec::new()).await.expect("run_attempt");
    let report = report.expect("report");
    assert!(!report.has_error);
    assert!(attempt.is_validation_pending());

    h.service
        .complete(0, ValidationResult::with_diagnostics(errors(&["late"])));
    settle(&attempt).await;

    let reports = finished_reports(&mut events);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].attempt, attempt.id());
    assert_ne!(reports[1].attempt, attempt.id());
    assert_eq!(reports[1].diagnostics, errors(&["late"]));
}

#[tokio::test]
async fn driver_finishes_attempt_when_options_fail() {
    let h = harness();
    let mut events = h.state.subscribe();
    let coordinator =
        ValidationCoordinator::new(Arc::new(FailingOptionsResolver), h.service.clone());
    let pipeline = BuildPipeline::new(h.config.clone(), h.state.clone(), coordinator);

    let build = vec![Diagnostic::warning("unused import")];
    let err = match pipeline.run_attempt(build.clone()).await {
        Ok(_) => panic!("options failure should propagate"),
        Err(err) => err,
    };
    assert!(matches!(err, CoordinatorError::Options(_)));
    assert_eq!(h.service.job_count(), 0);

    let reports = finished_reports(&mut events);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].diagnostics, build);
    assert!(!reports[0].has_error);
}

#[tokio::test]
async fn driver_skips_validation_when_build_failed() {
    let deletions = Arc::new(RecordingDeletionScheduler::new());
    let state = Arc::new(CompilerState::new(deletions));
    let service = Arc::new(ImmediateValidationService::new(ValidationResult::default()));
    let coordinator = ValidationCoordinator::new(
        Arc::new(FixedOptionsResolver::new(CompilerOptions::new())),
        service.clone(),
    );
    let pipeline = BuildPipeline::new(config(), state, coordinator);

    let (_attempt, report) = pipeline
        .run_attempt(errors(&["build failed"]))
        .await
        .expect("run_attempt");
    assert!(report.expect("report").has_error);
    assert_eq!(service.job_count(), 0);
}

#[tokio::test]
async fn driver_with_immediate_worker_reports_clean_build() {
    let deletions = Arc::new(RecordingDeletionScheduler::new());
    let state = Arc::new(CompilerState::new(deletions.clone()));
    let service = Arc::new(ImmediateValidationService::new(ValidationResult::default()));
    let coordinator = ValidationCoordinator::new(
        Arc::new(FixedOptionsResolver::new(CompilerOptions::new())),
        service.clone(),
    );
    let pipeline = BuildPipeline::new(config(), state, coordinator);

    let (attempt, report) = pipeline.run_attempt(Vec::new()).await.expect("run_attempt");
    let report = report.expect("report");
    assert!(!report.has_error);
    assert!(report.diagnostics.is_empty());
    assert!(!attempt.is_validation_pending());
    assert_eq!(service.job_count(), 1);
    assert_eq!(deletions.calls().len(), 2);
}
