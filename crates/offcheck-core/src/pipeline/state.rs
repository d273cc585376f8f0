//! Mutable pipeline state shared by every attempt.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use super::attempt::BuildAttempt;
use super::{AttemptId, BuildEvent};
use crate::domain::PipelineConfig;
use crate::services::DeletionScheduler;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Sources {
    root_files: Vec<PathBuf>,
    collections: Vec<String>,
}

/// Pipeline-state handle passed explicitly into every operation.
///
/// Owns the active-attempt counter: creating an attempt makes it the active
/// one and supersedes its predecessor.
pub struct CompilerState {
    sources: RwLock<Sources>,
    deletions: Arc<dyn DeletionScheduler>,
    last_attempt: AtomicU64,
    events: broadcast::Sender<BuildEvent>,
}

impl CompilerState {
    pub fn new(deletions: Arc<dyn DeletionScheduler>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sources: RwLock::new(Sources::default()),
            deletions,
            last_attempt: AtomicU64::new(0),
            events,
        }
    }

    /// State seeded with the root files and collections named in `config`.
    pub fn from_config(config: &PipelineConfig, deletions: Arc<dyn DeletionScheduler>) -> Self {
        let state = Self::new(deletions);
        state.set_root_files(config.root_files.iter().map(|p| config.resolve(p)).collect());
        for name in &config.collections {
            state.add_collection(name.clone());
        }
        state
    }

    fn read(&self) -> RwLockReadGuard<'_, Sources> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sources> {
        self.sources.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Known root source files, in discovery order.
    pub fn root_files(&self) -> Vec<PathBuf> {
        self.read().root_files.clone()
    }

    pub fn set_root_files(&self, root_files: Vec<PathBuf>) {
        self.write().root_files = root_files;
    }

    /// Names of known collections.
    pub fn collection_names(&self) -> Vec<String> {
        self.read().collections.clone()
    }

    /// Register a collection; duplicates are ignored.
    pub fn add_collection(&self, name: String) {
        let mut sources = self.write();
        if !sources.collections.contains(&name) {
            sources.collections.push(name);
        }
    }

    pub fn deletions(&self) -> &Arc<dyn DeletionScheduler> {
        &self.deletions
    }

    /// Create a new attempt and make it the active one.
    pub fn new_attempt(self: &Arc<Self>) -> BuildAttempt {
        let id = AttemptId(self.last_attempt.fetch_add(1, Ordering::SeqCst) + 1);
        BuildAttempt::new(id, Arc::clone(self))
    }

    /// Id of the most recently created attempt (`AttemptId(0)` before any).
    pub fn active_attempt_id(&self) -> AttemptId {
        AttemptId(self.last_attempt.load(Ordering::SeqCst))
    }

    /// Subscribe to attempt lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: BuildEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingDeletionScheduler;

    #[test]
    fn test_attempt_ids_increase() {
        let state = Arc::new(CompilerState::new(Arc::new(RecordingDeletionScheduler::new())));
        assert_eq!(state.active_attempt_id(), AttemptId(0));
        let a = state.new_attempt();
        let b = state.new_attempt();
        assert_eq!(a.id(), AttemptId(1));
        assert_eq!(b.id(), AttemptId(2));
        assert_eq!(state.active_attempt_id(), b.id());
    }

    #[test]
    fn test_from_config_resolves_roots() {
        let config = PipelineConfig {
            cwd: PathBuf::from("/work"),
            root_files: vec![PathBuf::from("src/a.tsx"), PathBuf::from("/abs/b.tsx")],
            collections: vec!["@ionic/core".to_string(), "@ionic/core".to_string()],
            ..PipelineConfig::default()
        };
        let state = CompilerState::from_config(&config, Arc::new(RecordingDeletionScheduler::new()));
        assert_eq!(
            state.root_files(),
            vec![PathBuf::from("/work/src/a.tsx"), PathBuf::from("/abs/b.tsx")]
        );
        assert_eq!(state.collection_names(), vec!["@ionic/core".to_string()]);
    }
}
