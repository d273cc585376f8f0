//! Pipeline configuration, loaded from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// File name of the generated declarations index, relative to `src_dir`.
pub const DECLARATIONS_INDEX_FILE: &str = "components.d.ts";

/// Read-only configuration for one build pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project root. Relative paths below are resolved against it.
    #[serde(default = "default_cwd")]
    pub cwd: PathBuf,

    /// Source directory holding the declarations index.
    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// tsconfig consulted for compiler options.
    #[serde(default = "default_tsconfig")]
    pub tsconfig: PathBuf,

    /// Initial root source files.
    #[serde(default)]
    pub root_files: Vec<PathBuf>,

    /// Known collection/package names.
    #[serde(default)]
    pub collections: Vec<String>,

    /// Configured output targets.
    #[serde(default)]
    pub output_targets: Vec<OutputTarget>,

    /// Watch mode: attempts finish without waiting on validation.
    #[serde(default)]
    pub watch: bool,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// One build output target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputTarget {
    /// Target kind, e.g. "dist" or "www".
    pub kind: String,

    /// Output directory.
    pub dir: PathBuf,

    /// Directory for emitted declaration files.
    #[serde(default)]
    pub types_dir: Option<PathBuf>,
}

/// Settings for the process-backed worker service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Checker argv; `-p <tsconfig>` is appended per job.
    #[serde(default = "default_worker_command")]
    pub command: Vec<String>,

    /// Per-job timeout in seconds (0 = no timeout).
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
            timeout_secs: default_worker_timeout(),
        }
    }
}

fn default_cwd() -> PathBuf {
    PathBuf::from(".")
}

fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_tsconfig() -> PathBuf {
    PathBuf::from("tsconfig.json")
}

fn default_worker_command() -> Vec<String> {
    vec!["npx".to_string(), "tsc".to_string()]
}

fn default_worker_timeout() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cwd: default_cwd(),
            src_dir: default_src_dir(),
            tsconfig: default_tsconfig(),
            root_files: Vec::new(),
            collections: Vec::new(),
            output_targets: Vec::new(),
            watch: false,
            worker: WorkerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A relative `cwd` is taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        if config.cwd.is_relative() {
            if let Some(parent) = path.parent() {
                config.cwd = parent.join(&config.cwd);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.command.is_empty() {
            return Err(ConfigError::Invalid(
                "worker.command must not be empty".to_string(),
            ));
        }
        if let Some(target) = self.output_targets.iter().find(|t| t.kind.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "output target at {} has an empty kind",
                target.dir.display()
            )));
        }
        Ok(())
    }

    /// Resolve `path` against `cwd` unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Path of the synthetic declarations index that validation always covers.
    pub fn declarations_index_path(&self) -> PathBuf {
        self.resolve(&self.src_dir).join(DECLARATIONS_INDEX_FILE)
    }

    /// True iff at least one output target requests a types directory.
    pub fn emits_declarations(&self) -> bool {
        self.output_targets.iter().any(|t| t.types_dir.is_some())
    }

    /// First configured types directory, resolved against `cwd`.
    pub fn types_dir(&self) -> Option<PathBuf> {
        self.output_targets
            .iter()
            .find_map(|t| t.types_dir.as_deref())
            .map(|dir| self.resolve(dir))
    }
}
