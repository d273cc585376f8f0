//! Domain models for offcheck.
//!
//! - `PipelineConfig`: read-only pipeline configuration
//! - `Diagnostic`: one validation finding
//! - `ValidationJob` / `ValidationResult`: worker request and response

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod job;

pub use config::{OutputTarget, PipelineConfig, WorkerConfig, DECLARATIONS_INDEX_FILE};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{ConfigError, CoordinatorError, OptionsError, Result, WorkerError};
pub use job::{collect_root_files, CompilerOptions, ValidationJob, ValidationResult};
