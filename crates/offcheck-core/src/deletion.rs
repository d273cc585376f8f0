//! Deferred filesystem cleanup.
//!
//! Build steps schedule stale outputs for deletion; validation may cancel
//! entries it still needs before [`DeletionQueue::flush`] removes the rest.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::debug;

use crate::services::DeletionScheduler;

#[derive(Debug, Default)]
struct Scheduled {
    dirs: BTreeSet<PathBuf>,
    files: BTreeSet<PathBuf>,
}

/// What a flush removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub dirs_removed: usize,
    pub files_removed: usize,
    /// Scheduled paths that were already gone.
    pub missing: usize,
}

/// In-memory queue of pending deletions.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    scheduled: Mutex<Scheduled>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Scheduled> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedule_delete_dir(&self, path: impl Into<PathBuf>) {
        self.lock().dirs.insert(path.into());
    }

    pub fn schedule_delete_file(&self, path: impl Into<PathBuf>) {
        self.lock().files.insert(path.into());
    }

    pub fn scheduled_dirs(&self) -> Vec<PathBuf> {
        self.lock().dirs.iter().cloned().collect()
    }

    pub fn scheduled_files(&self) -> Vec<PathBuf> {
        self.lock().files.iter().cloned().collect()
    }

    /// Remove every still-scheduled path from disk: files first, then directories.
    pub async fn flush(&self) -> std::io::Result<FlushSummary> {
        let Scheduled { dirs, files } = std::mem::take(&mut *self.lock());
        let mut summary = FlushSummary::default();

        for outcome in join_all(files.iter().map(|p| tokio::fs::remove_file(p))).await {
            match outcome {
                Ok(()) => summary.files_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => summary.missing += 1,
                Err(e) => return Err(e),
            }
        }
        for outcome in join_all(dirs.iter().map(|p| tokio::fs::remove_dir_all(p))).await {
            match outcome {
                Ok(()) => summary.dirs_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => summary.missing += 1,
                Err(e) => return Err(e),
            }
        }

        debug!(
            dirs = summary.dirs_removed,
            files = summary.files_removed,
            missing = summary.missing,
            "flushed scheduled deletions"
        );
        Ok(summary)
    }
}

fn cancel(set: &mut BTreeSet<PathBuf>, paths: &BTreeSet<PathBuf>, kind: &str) {
    let before = set.len();
    set.retain(|p| !paths.contains(p));
    let cancelled = before - set.len();
    if cancelled > 0 {
        debug!(kind, cancelled, "cancelled scheduled deletions");
    }
}

impl DeletionScheduler for DeletionQueue {
    fn cancel_delete_dirs(&self, paths: &BTreeSet<PathBuf>) {
        cancel(&mut self.lock().dirs, paths, "dir");
    }

    fn cancel_delete_files(&self, paths: &BTreeSet<PathBuf>) {
        cancel(&mut self.lock().files, paths, "file");
    }
}

/// Schedule every entry below `root` (but not `root` itself) for deletion.
pub fn schedule_tree(queue: &DeletionQueue, root: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            count += schedule_tree(queue, &path)?;
            queue.schedule_delete_dir(path);
        } else {
            queue.schedule_delete_file(path);
        }
        count += 1;
    }
    Ok(count)
}
