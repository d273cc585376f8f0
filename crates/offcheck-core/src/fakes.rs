//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides options resolvers, a manually-completed validation service and a
//! recording deletion scheduler that satisfy the trait contracts without a
//! filesystem or a checker process.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{
    CompilerOptions, OptionsError, PipelineConfig, ValidationJob, ValidationResult, WorkerError,
};
use crate::pipeline::CompilerState;
use crate::services::{
    CompilerOptionsResolver, DeletionScheduler, TicketSender, ValidationService, ValidationTicket,
};

// ---------------------------------------------------------------------------
// Options resolvers
// ---------------------------------------------------------------------------

/// Always resolves to the same options and counts calls.
#[derive(Debug, Default)]
pub struct FixedOptionsResolver {
    options: CompilerOptions,
    calls: AtomicUsize,
    yielding: bool,
}

impl FixedOptionsResolver {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            calls: AtomicUsize::new(0),
            yielding: false,
        }
    }

    /// Yield to the scheduler once before resolving, so concurrent callers
    /// interleave at the resolution await.
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompilerOptionsResolver for FixedOptionsResolver {
    async fn resolve(
        &self,
        _config: &PipelineConfig,
        _state: &CompilerState,
    ) -> Result<CompilerOptions, OptionsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.yielding {
            tokio::task::yield_now().await;
        }
        Ok(self.options.clone())
    }
}

/// Always fails with a malformed-tsconfig error.
#[derive(Debug, Default)]
pub struct FailingOptionsResolver;

#[async_trait]
impl CompilerOptionsResolver for FailingOptionsResolver {
    async fn resolve(
        &self,
        config: &PipelineConfig,
        _state: &CompilerState,
    ) -> Result<CompilerOptions, OptionsError> {
        Err(OptionsError::Malformed {
            path: config.resolve(&config.tsconfig),
            reason: "injected failure".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ManualValidationService
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Submission {
    job: ValidationJob,
    sender: Option<TicketSender>,
}

/// Records submitted jobs; tests decide when (and how) each one resolves.
#[derive(Debug, Default)]
pub struct ManualValidationService {
    submissions: Mutex<Vec<Submission>>,
}

impl ManualValidationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs submitted so far.
    pub fn job_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    /// Copies of the submitted jobs, in submission order.
    pub fn jobs(&self) -> Vec<ValidationJob> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.job.clone())
            .collect()
    }

    fn take_sender(&self, index: usize) -> Option<TicketSender> {
        self.submissions
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(|s| s.sender.take())
    }

    /// Resolve job `index` with `result`. Returns `false` if it was already
    /// resolved or its ticket is gone.
    pub fn complete(&self, index: usize, result: ValidationResult) -> bool {
        self.take_sender(index)
            .map(|sender| sender.resolve(Ok(result)))
            .unwrap_or(false)
    }

    /// Resolve job `index` with a worker error.
    pub fn fail(&self, index: usize, error: WorkerError) -> bool {
        self.take_sender(index)
            .map(|sender| sender.resolve(Err(error)))
            .unwrap_or(false)
    }

    /// Drop job `index` without resolving it.
    pub fn abandon(&self, index: usize) -> bool {
        self.take_sender(index).is_some()
    }
}

impl ValidationService for ManualValidationService {
    fn submit(&self, job: ValidationJob) -> ValidationTicket {
        let (sender, ticket) = ValidationTicket::channel();
        self.submissions.lock().unwrap().push(Submission {
            job,
            sender: Some(sender),
        });
        ticket
    }
}

/// Resolves every job immediately with a clone of the same result.
#[derive(Debug, Default)]
pub struct ImmediateValidationService {
    result: ValidationResult,
    submitted: AtomicUsize,
}

impl ImmediateValidationService {
    pub fn new(result: ValidationResult) -> Self {
        Self {
            result,
            submitted: AtomicUsize::new(0),
        }
    }

    pub fn job_count(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl ValidationService for ImmediateValidationService {
    fn submit(&self, _job: ValidationJob) -> ValidationTicket {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        ValidationTicket::ready(Ok(self.result.clone()))
    }
}

// ---------------------------------------------------------------------------
// RecordingDeletionScheduler
// ---------------------------------------------------------------------------

/// Which cancel operation was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelKind {
    Dirs,
    Files,
}

/// One recorded cancel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelCall {
    pub kind: CancelKind,
    pub paths: BTreeSet<PathBuf>,
}

/// Records every cancel call in order.
#[derive(Debug, Default)]
pub struct RecordingDeletionScheduler {
    calls: Mutex<Vec<CancelCall>>,
}

impl RecordingDeletionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CancelCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl DeletionScheduler for RecordingDeletionScheduler {
    fn cancel_delete_dirs(&self, paths: &BTreeSet<PathBuf>) {
        self.calls.lock().unwrap().push(CancelCall {
            kind: CancelKind::Dirs,
            paths: paths.clone(),
        });
    }

    fn cancel_delete_files(&self, paths: &BTreeSet<PathBuf>) {
        self.calls.lock().unwrap().push(CancelCall {
            kind: CancelKind::Files,
            paths: paths.clone(),
        });
    }
}
