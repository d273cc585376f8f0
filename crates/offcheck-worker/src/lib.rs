//! offcheck worker - isolated type validation
//!
//! Provides the process-backed validation service that:
//! - Writes a per-job tsconfig with the resolved compiler options
//! - Runs the type checker as a child process with a timeout
//! - Parses checker output into diagnostics
//! - Reports emitted declaration outputs

pub mod parse;
pub mod runner;
pub mod service;

pub use parse::{parse_checker_output, parse_line, ParserConfig};
pub use runner::{CheckerOutput, CheckerRunner, RunnerError};
pub use service::{project_document, run_job, ProcessValidationService};
