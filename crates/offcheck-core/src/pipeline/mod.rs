//! Build pipeline state: attempts, their reports, and the driver.

pub mod attempt;
pub mod driver;
pub mod state;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Diagnostic;

pub use attempt::{BuildAttempt, MergeOutcome, Phase};
pub use driver::BuildPipeline;
pub use state::CompilerState;

/// Identifier of a build attempt, increasing per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a finished attempt reports to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub attempt: AttemptId,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// Attempt lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Started(AttemptId),
    Finished(BuildReport),
}
