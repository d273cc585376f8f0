//! Checker process execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use offcheck_core::WorkerError;
use tokio::process::Command;
use tracing::debug;

/// Captured output of one checker run.
#[derive(Debug, Clone)]
pub struct CheckerOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process exited successfully.
    pub success: bool,
}

impl CheckerOutput {
    /// Whether the checker passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_line(&self) -> Option<&str> {
        last_non_empty(&self.stderr).or_else(|| last_non_empty(&self.stdout))
    }
}

fn last_non_empty(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Errors from launching or waiting on the checker.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("checker command is empty")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checker timed out after {0} seconds")]
    TimedOut(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RunnerError> for WorkerError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::EmptyCommand => WorkerError::Spawn {
                command: String::new(),
                reason: "empty command".to_string(),
            },
            RunnerError::Spawn { command, source } => WorkerError::Spawn {
                command,
                reason: source.to_string(),
            },
            RunnerError::TimedOut(secs) => WorkerError::TimedOut { secs },
            RunnerError::Io(e) => WorkerError::Io(e),
        }
    }
}

/// Runs the checker as a child process.
pub struct CheckerRunner;

impl CheckerRunner {
    /// Run `command` in `cwd` and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect the output.
    /// `timeout_secs == 0` disables the timeout. The child is killed if the
    /// timeout fires.
    pub async fn execute(
        command: &[String],
        cwd: &Path,
        timeout_secs: u64,
    ) -> Result<CheckerOutput, RunnerError> {
        let start = Instant::now();

        let (exe, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;

        debug!(command = %command.join(" "), cwd = %cwd.display(), "spawning checker");
        let child = Command::new(exe)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.join(" "),
                source,
            })?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| RunnerError::TimedOut(timeout_secs))??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, duration_ms, "checker exited");

        Ok(CheckerOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms,
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_output_passed() {
        let output = CheckerOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 100,
            success: true,
        };
        assert!(output.passed());
        assert_eq!(output.last_line(), None);
    }

    #[test]
    fn test_last_line_prefers_stderr() {
        let output = CheckerOutput {
            exit_code: 1,
            stdout: "out\n".to_string(),
            stderr: "first\nlast one\n\n".to_string(),
            duration_ms: 1,
            success: false,
        };
        assert!(!output.passed());
        assert_eq!(output.last_line(), Some("last one"));
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let output = CheckerRunner::execute(&argv(&["echo", "hello"]), Path::new("."), 60)
            .await
            .expect("execute failed");
        assert!(output.passed());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let output = CheckerRunner::execute(&argv(&["false"]), Path::new("."), 60)
            .await
            .expect("execute failed");
        assert!(!output.success);
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_execute_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let output = CheckerRunner::execute(&argv(&["ls"]), dir.path(), 60)
            .await
            .expect("execute failed");
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let err = CheckerRunner::execute(&argv(&["sleep", "5"]), Path::new("."), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut(1)));
        assert!(matches!(
            WorkerError::from(err),
            WorkerError::TimedOut { secs: 1 }
        ));
    }

    #[tokio::test]
    async fn test_execute_empty_and_missing_commands() {
        let err = CheckerRunner::execute(&[], Path::new("."), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand));

        let err = CheckerRunner::execute(
            &argv(&["offcheck-definitely-not-installed"]),
            Path::new("."),
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
