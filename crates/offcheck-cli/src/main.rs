//! offcheck - out-of-band type validation
//!
//! The `offcheck` command runs one build attempt for a pipeline config and
//! reports the type diagnostics gathered by the isolated checker.
//!
//! ## Commands
//!
//! - `validate`: Run one attempt and print its report(s)
//! - `config`: Print the resolved pipeline configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offcheck_core::{
    schedule_tree, BuildEvent, BuildPipeline, BuildReport, CompilerState, DeletionQueue,
    PipelineConfig, TsconfigResolver, ValidationCoordinator, METRICS,
};
use offcheck_worker::ProcessValidationService;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "offcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Out-of-band type validation for incremental builds", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline config file
    #[arg(short, long, global = true, env = "OFFCHECK_CONFIG", default_value = "offcheck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one build attempt and report type diagnostics
    Validate {
        /// Finish the attempt without waiting; late diagnostics arrive in a follow-up report
        #[arg(long)]
        watch: bool,

        /// Print reports as JSON
        #[arg(long)]
        report_json: bool,

        /// Keep stale declaration outputs instead of deleting them
        #[arg(long)]
        keep_stale: bool,
    },

    /// Print the resolved pipeline configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    offcheck_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate {
            watch,
            report_json,
            keep_stale,
        } => cmd_validate(&cli.config, watch, report_json, keep_stale).await,
        Commands::Config => cmd_config(&cli.config),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn cmd_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn cmd_validate(
    path: &Path,
    watch: bool,
    report_json: bool,
    keep_stale: bool,
) -> Result<()> {
    let mut config = load_config(path)?;
    config.watch |= watch;

    // Everything under the types dir is stale until validation re-emits it.
    let queue = Arc::new(DeletionQueue::new());
    if let Some(types_dir) = config.types_dir() {
        let scheduled = schedule_tree(&queue, &types_dir)
            .with_context(|| format!("Failed to scan {}", types_dir.display()))?;
        info!(dir = %types_dir.display(), scheduled, "scheduled stale declaration outputs");
    }

    let state = Arc::new(CompilerState::from_config(&config, queue.clone()));
    let coordinator = ValidationCoordinator::new(
        Arc::new(TsconfigResolver::new()),
        Arc::new(ProcessValidationService::new(config.worker.clone())),
    );
    let pipeline = BuildPipeline::new(config, state.clone(), coordinator);
    let mut events = state.subscribe();

    let (attempt, _) = pipeline
        .run_attempt(Vec::new())
        .await
        .context("Failed to start type validation")?;
    // In watch mode the attempt is already finished; wait for the follow-up.
    attempt.wait_for_validation().await;

    let reports = drain_reports(&mut events);
    for report in &reports {
        if report_json {
            println!("{}", serde_json::to_string(&ReportLine::from(report))?);
        } else {
            print!("{}", render_report(report));
        }
    }

    let metrics = METRICS.snapshot();
    if keep_stale || metrics.worker_failures > 0 {
        if metrics.worker_failures > 0 {
            warn!("checker failed; keeping existing declaration outputs");
        }
    } else {
        let summary = queue
            .flush()
            .await
            .context("Failed to remove stale declaration outputs")?;
        info!(
            files = summary.files_removed,
            dirs = summary.dirs_removed,
            "removed stale declaration outputs"
        );
    }
    METRICS.flush();

    if reports.iter().any(|r| r.has_error) {
        anyhow::bail!("type validation reported errors");
    }
    Ok(())
}

fn drain_reports(events: &mut broadcast::Receiver<BuildEvent>) -> Vec<BuildReport> {
    let mut reports = Vec::new();
    loop {
        match events.try_recv() {
            Ok(BuildEvent::Finished(report)) => reports.push(report),
            Ok(BuildEvent::Started(_)) => {}
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "missed build events");
            }
            Err(_) => break,
        }
    }
    reports
}

/// One JSON line per report.
#[derive(Serialize)]
struct ReportLine<'a> {
    attempt: u64,
    has_error: bool,
    errors: usize,
    duration_ms: u64,
    diagnostics: &'a [offcheck_core::Diagnostic],
}

impl<'a> From<&'a BuildReport> for ReportLine<'a> {
    fn from(report: &'a BuildReport) -> Self {
        Self {
            attempt: report.attempt.0,
            has_error: report.has_error,
            errors: report.error_count(),
            duration_ms: report.duration_ms,
            diagnostics: &report.diagnostics,
        }
    }
}

fn render_report(report: &BuildReport) -> String {
    let mut out = String::new();
    for diagnostic in &report.diagnostics {
        out.push_str(&format!("  {}\n", diagnostic));
    }
    let status = if report.has_error { "✗ FAILED" } else { "✓ PASSED" };
    out.push_str(&format!(
        "Attempt {}: {} ({} diagnostics, {} errors, {}ms)\n",
        report.attempt,
        status,
        report.diagnostics.len(),
        report.error_count(),
        report.duration_ms
    ));
    out
}
