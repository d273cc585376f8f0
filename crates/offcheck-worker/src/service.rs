//! Process-backed [`ValidationService`].
//!
//! Each job writes a throwaway tsconfig holding the resolved compiler options
//! and the job's root files, runs the checker against it, and parses the
//! output. Declaration outputs are reported back so the pipeline does not
//! delete them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, FutureExt};
use offcheck_core::{
    CompilerOptions, ValidationJob, ValidationResult, ValidationService, ValidationTicket,
    WorkerConfig, WorkerError, WorkerOutcome,
};
use serde_json::{json, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::parse::{parse_checker_output, ParserConfig};
use crate::runner::CheckerRunner;

/// Options holding a single path, resolved relative to the tsconfig.
const PATH_OPTIONS: &[&str] = &[
    "baseUrl",
    "rootDir",
    "outDir",
    "declarationDir",
    "tsBuildInfoFile",
];

/// Options holding a list of paths.
const PATH_LIST_OPTIONS: &[&str] = &["typeRoots", "rootDirs"];

/// Runs each job in a separate checker process.
#[derive(Debug, Clone)]
pub struct ProcessValidationService {
    config: WorkerConfig,
    parser: ParserConfig,
}

impl ProcessValidationService {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            parser: ParserConfig::default(),
        }
    }

    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

impl ValidationService for ProcessValidationService {
    /// Spawns the job onto the current tokio runtime.
    fn submit(&self, job: ValidationJob) -> ValidationTicket {
        let (sender, ticket) = ValidationTicket::channel();
        let config = self.config.clone();
        let parser = self.parser.clone();
        let digest = job.digest();
        let span = info_span!("offcheck.worker", job = %&digest[..12.min(digest.len())]);

        tokio::spawn(
            async move {
                let outcome = run_job(&config, &parser, job).await;
                if let Err(e) = &outcome {
                    warn!(error = %e, "validation job failed");
                }
                if !sender.resolve(outcome) {
                    debug!("validation ticket dropped before the job finished");
                }
            }
            .instrument(span),
        );
        ticket
    }
}

/// Run one job to completion.
pub async fn run_job(
    config: &WorkerConfig,
    parser: &ParserConfig,
    job: ValidationJob,
) -> WorkerOutcome {
    let workspace = tempfile::Builder::new().prefix("offcheck-").tempdir()?;
    let project = workspace.path().join("tsconfig.json");
    let document = project_document(&job);
    let bytes =
        serde_json::to_vec_pretty(&document).map_err(|e| WorkerError::Protocol(e.to_string()))?;
    tokio::fs::write(&project, bytes).await?;

    let mut command = config.command.clone();
    command.extend(["--pretty", "false", "-p"].map(String::from));
    command.push(project.to_string_lossy().into_owned());

    let output = CheckerRunner::execute(&command, &job.cwd, config.timeout_secs).await?;
    let diagnostics = parse_checker_output(&output, parser);
    debug!(
        exit_code = output.exit_code,
        duration_ms = output.duration_ms,
        diagnostics = diagnostics.len(),
        "checker finished"
    );

    let mut result = ValidationResult::with_diagnostics(diagnostics);
    if job.emit_declarations {
        if let Some(dir) = job.compiler_options.declaration_dir() {
            collect_outputs(job.cwd.join(dir), &mut result).await?;
        }
    }
    Ok(result)
}

/// The generated tsconfig for `job`.
pub fn project_document(job: &ValidationJob) -> Value {
    let mut options = job.compiler_options.clone();
    absolutize_paths(&mut options, &job.cwd);
    let files: Vec<String> = job
        .root_files
        .iter()
        .map(|p| job.cwd.join(p).to_string_lossy().into_owned())
        .collect();
    json!({
        "compilerOptions": options.into_value(),
        "files": files,
    })
}

/// Rebase relative path options onto `cwd`; the generated tsconfig lives elsewhere.
fn absolutize_paths(options: &mut CompilerOptions, cwd: &Path) {
    let rebase = |raw: &str| Value::from(cwd.join(raw).to_string_lossy().into_owned());

    for key in PATH_OPTIONS {
        let rebased = match options.get(key) {
            Some(Value::String(raw)) => Some(rebase(raw)),
            _ => None,
        };
        if let Some(value) = rebased {
            options.insert(*key, value);
        }
    }
    for key in PATH_LIST_OPTIONS {
        let rebased = match options.get(key) {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(raw) => rebase(raw),
                        other => other.clone(),
                    })
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };
        if let Some(items) = rebased {
            options.insert(*key, Value::Array(items));
        }
    }
    // `paths` entries resolve against the tsconfig when baseUrl is unset.
    if options.get("paths").is_some() && options.get("baseUrl").is_none() {
        options.insert("baseUrl", cwd.to_string_lossy().into_owned());
    }
}

/// Record `dir` and everything below it. A missing directory records nothing.
fn collect_outputs(dir: PathBuf, result: &mut ValidationResult) -> BoxFuture<'_, std::io::Result<()>> {
    async move {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        result.dir_paths.insert(dir);
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                collect_outputs(path, &mut *result).await?;
            } else {
                result.file_paths.insert(path);
            }
        }
        Ok(())
    }
    .boxed()
}
