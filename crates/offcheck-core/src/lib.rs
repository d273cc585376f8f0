//! offcheck core library
//!
//! Moves full type validation off the critical path of an incremental build:
//! the coordinator dispatches a job to an isolated worker and reconciles the
//! result against whichever build attempt is appropriate when it arrives.

pub mod coordinator;
pub mod deletion;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod options;
pub mod pipeline;
pub mod services;
pub mod telemetry;

pub use coordinator::{
    Dispatch, PendingValidation, Reconciled, SettleSignal, SkipReason, ValidationCoordinator,
};
pub use deletion::{schedule_tree, DeletionQueue, FlushSummary};
pub use domain::{
    collect_root_files, CompilerOptions, ConfigError, CoordinatorError, Diagnostic, OptionsError,
    OutputTarget, PipelineConfig, Result, Severity, ValidationJob, ValidationResult, WorkerConfig,
    WorkerError, DECLARATIONS_INDEX_FILE,
};
pub use metrics::{MetricsSnapshot, METRICS};
pub use obs::ValidationSpan;
pub use options::{apply_pipeline_overrides, TsconfigResolver};
pub use pipeline::{
    AttemptId, BuildAttempt, BuildEvent, BuildPipeline, BuildReport, CompilerState, MergeOutcome,
    Phase,
};
pub use services::{
    CompilerOptionsResolver, DeletionScheduler, TicketSender, ValidationService,
    ValidationTicket, WorkerOutcome,
};
pub use telemetry::init_tracing;

/// offcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
