//! Error taxonomy for offcheck.

use std::path::PathBuf;

/// Errors loading a pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors resolving effective compiler options.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("tsconfig not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read tsconfig {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tsconfig {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Errors reported by a worker service instead of a result.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn checker `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("checker timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("checker produced no usable result: {0}")]
    Protocol(String),

    #[error("worker dropped the job without resolving it")]
    Abandoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the validation coordinator entry point.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("compiler options resolution failed: {0}")]
    Options(#[from] OptionsError),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
