//! Validation job input and worker result types.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::diagnostic::Diagnostic;

/// Effective compiler options handed to the worker.
///
/// Kept as a JSON object so that checker-specific keys pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompilerOptions(Map<String, Value>);

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or replace an option, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// `declarationDir`, if set.
    pub fn declaration_dir(&self) -> Option<PathBuf> {
        self.get("declarationDir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    /// `outDir`, if set.
    pub fn out_dir(&self) -> Option<PathBuf> {
        self.get("outDir").and_then(Value::as_str).map(PathBuf::from)
    }

    /// `strict`, defaulting to `false`.
    pub fn strict(&self) -> bool {
        self.get("strict").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for CompilerOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A request sent to the worker service. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationJob {
    /// Resolved compiler options.
    pub compiler_options: CompilerOptions,

    /// Ordered, deduplicated root files, declarations index included.
    pub root_files: Vec<PathBuf>,

    /// Whether declaration files should be emitted.
    pub emit_declarations: bool,

    /// Known collection/package names.
    pub collection_names: Vec<String>,

    /// Working directory for the checker.
    pub cwd: PathBuf,
}

impl ValidationJob {
    /// SHA-256 hex digest identifying this job.
    ///
    /// Root file order is significant; option key order is not (serde_json
    /// keeps object keys sorted).
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Value::Object(self.compiler_options.as_map().clone()).to_string());
        hasher.update(b"\0");
        for file in &self.root_files {
            hasher.update(file.to_string_lossy().as_bytes());
            hasher.update(b"\0");
        }
        hasher.update([self.emit_declarations as u8]);
        for name in &self.collection_names {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(self.cwd.to_string_lossy().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Build the job's root file list from the pipeline's known roots.
///
/// Duplicates are dropped (first occurrence wins) and `declarations_index`
/// is appended when it is not already present, so it appears exactly once.
pub fn collect_root_files(known_roots: &[PathBuf], declarations_index: &Path) -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    let mut files: Vec<PathBuf> = known_roots
        .iter()
        .filter(|path| seen.insert(path.as_path()))
        .cloned()
        .collect();

    if !seen.contains(declarations_index) {
        files.push(declarations_index.to_path_buf());
    }
    files
}

/// The worker's response to a single job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Findings in checker order.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,

    /// Directories whose scheduled deletion must be cancelled.
    #[serde(default)]
    pub dir_paths: BTreeSet<PathBuf>,

    /// Files whose scheduled deletion must be cancelled.
    #[serde(default)]
    pub file_paths: BTreeSet<PathBuf>,
}

impl ValidationResult {
    pub fn with_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
