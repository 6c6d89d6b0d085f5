//! Checkpoint records and storage backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::LoopState;
use crate::error::{Result, RunloopError};
use crate::id::{generate_checkpoint_id, now_ms};

/// A durable snapshot of a session at one iteration.
///
/// Keyed by (session_id, iteration); a later put at the same iteration
/// replaces the earlier one in every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier ("ckpt-{timestamp}-{hex}")
    pub checkpoint_id: String,
    /// Session this checkpoint belongs to
    pub session_id: String,
    /// Iteration the snapshot was taken at
    pub iteration: u32,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Full session state snapshot
    pub state: LoopState,
}

impl Checkpoint {
    /// Snapshot the given state with a freshly generated id
    pub fn from_state(state: &LoopState) -> Self {
        Self {
            checkpoint_id: generate_checkpoint_id(),
            session_id: state.session_id.clone(),
            iteration: state.current_iteration,
            created_at: now_ms(),
            state: state.clone(),
        }
    }
}

/// Metadata about a checkpoint (without the full state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Unique checkpoint identifier
    pub checkpoint_id: String,
    /// Iteration the checkpoint was taken at
    pub iteration: u32,
    /// When the checkpoint was created
    pub created_at: i64,
}

impl From<&Checkpoint> for CheckpointMetadata {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            iteration: checkpoint.iteration,
            created_at: checkpoint.created_at,
        }
    }
}

/// Storage backend for checkpoints.
///
/// The primary and fallback tiers implement the identical contract, so the
/// manager can switch between them without the caller noticing.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any existing one at its iteration
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Load the checkpoint at a specific iteration
    async fn get(&self, session_id: &str, iteration: u32) -> Result<Option<Checkpoint>>;

    /// List checkpoint metadata for a session, ascending by iteration
    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointMetadata>>;

    /// List all sessions that have checkpoints.
    ///
    /// Default implementation returns an error; backends that can enumerate
    /// sessions cheaply override it.
    async fn sessions(&self) -> Result<Vec<String>> {
        Err(RunloopError::Storage(
            "session listing not supported by this store".to_string(),
        ))
    }
}

/// In-memory checkpoint storage.
///
/// Stands in for the fast shared session-memory tier; clones share the same
/// underlying map. Does not survive the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    checkpoints: Arc<Mutex<HashMap<(String, u32), Checkpoint>>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints across all sessions
    pub fn len(&self) -> usize {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Drop all checkpoints
    pub fn clear(&self) {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        checkpoints.insert(
            (checkpoint.session_id.clone(), checkpoint.iteration),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn get(&self, session_id: &str, iteration: u32) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        Ok(checkpoints
            .get(&(session_id.to_string(), iteration))
            .cloned())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<CheckpointMetadata>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut metadata: Vec<_> = checkpoints
            .values()
            .filter(|cp| cp.session_id == session_id)
            .map(CheckpointMetadata::from)
            .collect();
        metadata.sort_by_key(|m| m.iteration);
        Ok(metadata)
    }

    async fn sessions(&self) -> Result<Vec<String>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        let mut sessions: Vec<String> = checkpoints
            .keys()
            .map(|(session_id, _)| session_id.clone())
            .collect();
        sessions.sort();
        sessions.dedup();
        Ok(sessions)
    }
}

/// Provisions the primary checkpoint store on first use.
///
/// Real deployments point this at the shared session-memory service;
/// provisioning may be slow or fail outright, which is why the manager
/// drives it through a timeout.
#[async_trait]
pub trait StoreProvisioner: Send + Sync {
    /// Provision a store, optionally pinned to a locality region
    async fn provision(&self, region: Option<&str>) -> Result<Arc<dyn CheckpointStore>>;
}

/// Provisioner that hands out a shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryProvisioner {
    store: MemoryStore,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store every provision call returns a handle to
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }
}

#[async_trait]
impl StoreProvisioner for MemoryProvisioner {
    async fn provision(&self, _region: Option<&str>) -> Result<Arc<dyn CheckpointStore>> {
        Ok(Arc::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(session_id: &str, iteration: u32) -> LoopState {
        let mut state = LoopState::new(session_id, "agent", 10, vec![]);
        state.current_iteration = iteration;
        state.agent_state = serde_json::json!({ "iteration": iteration });
        state
    }

    #[test]
    fn test_checkpoint_from_state() {
        let state = sample_state("sess-1", 4);
        let checkpoint = Checkpoint::from_state(&state);
        assert!(checkpoint.checkpoint_id.starts_with("ckpt-"));
        assert_eq!(checkpoint.session_id, "sess-1");
        assert_eq!(checkpoint.iteration, 4);
        assert!(checkpoint.created_at > 0);
        assert_eq!(checkpoint.state, state);
    }

    #[test]
    fn test_metadata_from_checkpoint() {
        let checkpoint = Checkpoint::from_state(&sample_state("sess-1", 2));
        let metadata = CheckpointMetadata::from(&checkpoint);
        assert_eq!(metadata.checkpoint_id, checkpoint.checkpoint_id);
        assert_eq!(metadata.iteration, 2);
        assert_eq!(metadata.created_at, checkpoint.created_at);
    }

    #[tokio::test]
    async fn test_memory_store_put_and_get() {
        let store = MemoryStore::new();
        let checkpoint = Checkpoint::from_state(&sample_state("sess-1", 3));

        store.put(&checkpoint).await.unwrap();
        let loaded = store.get("sess-1", 3).await.unwrap();
        assert_eq!(loaded, Some(checkpoint));
    }

    #[tokio::test]
    async fn test_memory_store_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get("sess-1", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_overwrites_same_iteration() {
        let store = MemoryStore::new();

        let first = Checkpoint::from_state(&sample_state("sess-1", 2));
        store.put(&first).await.unwrap();

        let mut newer_state = sample_state("sess-1", 2);
        newer_state.agent_state = serde_json::json!({ "revised": true });
        let second = Checkpoint::from_state(&newer_state);
        store.put(&second).await.unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.get("sess-1", 2).await.unwrap().unwrap();
        assert_eq!(loaded.checkpoint_id, second.checkpoint_id);
        assert_eq!(loaded.state.agent_state["revised"], true);
    }

    #[tokio::test]
    async fn test_memory_store_list_ascending() {
        let store = MemoryStore::new();
        for iteration in [4, 1, 9, 2] {
            store
                .put(&Checkpoint::from_state(&sample_state("sess-1", iteration)))
                .await
                .unwrap();
        }
        // Another session should not appear
        store
            .put(&Checkpoint::from_state(&sample_state("sess-2", 7)))
            .await
            .unwrap();

        let metadata = store.list("sess-1").await.unwrap();
        let iterations: Vec<u32> = metadata.iter().map(|m| m.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 4, 9]);
    }

    #[tokio::test]
    async fn test_memory_store_sessions() {
        let store = MemoryStore::new();
        store
            .put(&Checkpoint::from_state(&sample_state("sess-b", 0)))
            .await
            .unwrap();
        store
            .put(&Checkpoint::from_state(&sample_state("sess-a", 0)))
            .await
            .unwrap();
        store
            .put(&Checkpoint::from_state(&sample_state("sess-a", 5)))
            .await
            .unwrap();

        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions, vec!["sess-a".to_string(), "sess-b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();

        store
            .put(&Checkpoint::from_state(&sample_state("sess-1", 0)))
            .await
            .unwrap();

        assert_eq!(clone.len(), 1);
        assert!(clone.get("sess-1", 0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_provisioner_hands_out_shared_store() {
        let provisioner = MemoryProvisioner::new();
        let provisioned = provisioner.provision(None).await.unwrap();

        let checkpoint = Checkpoint::from_state(&sample_state("sess-1", 1));
        provisioned.put(&checkpoint).await.unwrap();

        // Visible through the provisioner's own handle
        assert_eq!(provisioner.store().len(), 1);
    }

    #[tokio::test]
    async fn test_default_sessions_is_unsupported() {
        struct Minimal;

        #[async_trait]
        impl CheckpointStore for Minimal {
            async fn put(&self, _checkpoint: &Checkpoint) -> Result<()> {
                Ok(())
            }
            async fn get(&self, _session_id: &str, _iteration: u32) -> Result<Option<Checkpoint>> {
                Ok(None)
            }
            async fn list(&self, _session_id: &str) -> Result<Vec<CheckpointMetadata>> {
                Ok(vec![])
            }
        }

        let err = Minimal.sessions().await.unwrap_err();
        assert!(matches!(err, RunloopError::Storage(_)));
    }
}
