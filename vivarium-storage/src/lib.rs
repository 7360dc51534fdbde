//! Vivarium Storage - Snapshot Persistence
//!
//! Defines the snapshot persistence abstraction: two named whole-collection
//! snapshots (agents, memories), written after every mutation and read once
//! at bootstrap. No partial or incremental persistence exists; a snapshot is
//! always a flat serialize/deserialize of the full collection.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::debug;
use vivarium_core::{Agent, MemoryEntry, StorageError, VivariumResult};

/// Name of the agents snapshot.
pub const AGENTS_SNAPSHOT: &str = "agents";

/// Name of the memories snapshot.
pub const MEMORIES_SNAPSHOT: &str = "memories";

// ============================================================================
// SNAPSHOT STORE TRAIT
// ============================================================================

/// Persistence trait for whole-state snapshots.
/// Implementations must be thread-safe (Send + Sync).
///
/// `load_*` returns `Ok(None)` when no snapshot has been written yet; the
/// caller falls back to its seed state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the full agent collection.
    async fn save_agents(&self, agents: &[Agent]) -> VivariumResult<()>;

    /// Load the agent collection, or `None` if never saved.
    async fn load_agents(&self) -> VivariumResult<Option<Vec<Agent>>>;

    /// Persist the full memory-ledger contents.
    async fn save_memories(&self, memories: &[MemoryEntry]) -> VivariumResult<()>;

    /// Load the memory-ledger contents, or `None` if never saved.
    async fn load_memories(&self) -> VivariumResult<Option<Vec<MemoryEntry>>>;
}

// ============================================================================
// IN-MEMORY STORE (MOCK)
// ============================================================================

/// In-memory snapshot store for tests.
///
/// Snapshots are held as serialized JSON so every save/load exercises the
/// same round-trip a durable store would. Save counters let tests assert
/// that mutations were persisted.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    agents: RwLock<Option<String>>,
    memories: RwLock<Option<String>>,
    agent_saves: AtomicUsize,
    memory_saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the agents snapshot has been written.
    pub fn agent_saves(&self) -> usize {
        self.agent_saves.load(Ordering::Relaxed)
    }

    /// Number of times the memories snapshot has been written.
    pub fn memory_saves(&self) -> usize {
        self.memory_saves.load(Ordering::Relaxed)
    }
}

fn serialize<T: serde::Serialize>(snapshot: &str, value: &T) -> VivariumResult<String> {
    serde_json::to_string(value).map_err(|e| {
        StorageError::SerializationFailed {
            snapshot: snapshot.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn deserialize<T: serde::de::DeserializeOwned>(
    snapshot: &str,
    blob: &str,
) -> VivariumResult<T> {
    serde_json::from_str(blob).map_err(|e| {
        StorageError::SnapshotReadFailed {
            snapshot: snapshot.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_agents(&self, agents: &[Agent]) -> VivariumResult<()> {
        let blob = serialize(AGENTS_SNAPSHOT, &agents)?;
        let mut slot = self
            .agents
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *slot = Some(blob);
        self.agent_saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn load_agents(&self) -> VivariumResult<Option<Vec<Agent>>> {
        let slot = self.agents.read().map_err(|_| StorageError::LockPoisoned)?;
        match slot.as_deref() {
            Some(blob) => Ok(Some(deserialize(AGENTS_SNAPSHOT, blob)?)),
            None => Ok(None),
        }
    }

    async fn save_memories(&self, memories: &[MemoryEntry]) -> VivariumResult<()> {
        let blob = serialize(MEMORIES_SNAPSHOT, &memories)?;
        let mut slot = self
            .memories
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *slot = Some(blob);
        self.memory_saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn load_memories(&self) -> VivariumResult<Option<Vec<MemoryEntry>>> {
        let slot = self
            .memories
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        match slot.as_deref() {
            Some(blob) => Ok(Some(deserialize(MEMORIES_SNAPSHOT, blob)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

/// Durable snapshot store: one JSON file per snapshot inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, snapshot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", snapshot))
    }

    async fn write_blob(&self, snapshot: &str, blob: String) -> VivariumResult<()> {
        let path = self.path_for(snapshot);
        debug!(snapshot, path = %path.display(), "writing snapshot");
        tokio::fs::write(&path, blob).await.map_err(|e| {
            StorageError::SnapshotWriteFailed {
                snapshot: snapshot.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn read_blob(&self, snapshot: &str) -> VivariumResult<Option<String>> {
        let path = self.path_for(snapshot);
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(snapshot, "no snapshot on disk");
                Ok(None)
            }
            Err(e) => Err(StorageError::SnapshotReadFailed {
                snapshot: snapshot.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save_agents(&self, agents: &[Agent]) -> VivariumResult<()> {
        let blob = serialize(AGENTS_SNAPSHOT, &agents)?;
        self.write_blob(AGENTS_SNAPSHOT, blob).await
    }

    async fn load_agents(&self) -> VivariumResult<Option<Vec<Agent>>> {
        match self.read_blob(AGENTS_SNAPSHOT).await? {
            Some(blob) => Ok(Some(deserialize(AGENTS_SNAPSHOT, &blob)?)),
            None => Ok(None),
        }
    }

    async fn save_memories(&self, memories: &[MemoryEntry]) -> VivariumResult<()> {
        let blob = serialize(MEMORIES_SNAPSHOT, &memories)?;
        self.write_blob(MEMORIES_SNAPSHOT, blob).await
    }

    async fn load_memories(&self) -> VivariumResult<Option<Vec<MemoryEntry>>> {
        match self.read_blob(MEMORIES_SNAPSHOT).await? {
            Some(blob) => Ok(Some(deserialize(MEMORIES_SNAPSHOT, &blob)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::{StorageError, VivariumError};

    #[tokio::test]
    async fn test_in_memory_load_before_save_is_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load_agents().await.unwrap().is_none());
        assert!(store.load_memories().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_agents_round_trip() {
        let store = InMemorySnapshotStore::new();
        let agents = vec![
            Agent::new("🦊", "Spark", "Curious").with_position(100.0, 150.0),
            Agent::new("👾", "Neon", "Analytic").with_level(3),
        ];
        store.save_agents(&agents).await.unwrap();
        let loaded = store.load_agents().await.unwrap().unwrap();
        assert_eq!(loaded, agents);
        assert_eq!(store.agent_saves(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_memories_round_trip() {
        let store = InMemorySnapshotStore::new();
        let memories = vec![
            MemoryEntry::new("the sky is blue"),
            MemoryEntry::new("tea before noon"),
        ];
        store.save_memories(&memories).await.unwrap();
        let loaded = store.load_memories().await.unwrap().unwrap();
        assert_eq!(loaded, memories);
        assert_eq!(store.memory_saves(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_save_overwrites_whole_snapshot() {
        let store = InMemorySnapshotStore::new();
        store
            .save_agents(&[Agent::new("🦊", "Spark", "Curious")])
            .await
            .unwrap();
        store.save_agents(&[]).await.unwrap();
        let loaded = store.load_agents().await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(store.agent_saves(), 2);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let agents = vec![Agent::new("🎙️", "Echo", "Harmonious")];
        let memories = vec![MemoryEntry::new("the sky is blue")];
        store.save_agents(&agents).await.unwrap();
        store.save_memories(&memories).await.unwrap();

        assert_eq!(store.load_agents().await.unwrap().unwrap(), agents);
        assert_eq!(store.load_memories().await.unwrap().unwrap(), memories);
        assert!(dir.path().join("agents.json").exists());
        assert!(dir.path().join("memories.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_agents().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_snapshot_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agents.json"), "not-json").unwrap();
        let store = JsonFileStore::new(dir.path());
        let result = store.load_agents().await;
        assert!(matches!(
            result,
            Err(VivariumError::Storage(StorageError::SnapshotReadFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_file_store_write_to_missing_dir_fails() {
        let store = JsonFileStore::new("/nonexistent/vivarium-snapshots");
        let result = store.save_agents(&[]).await;
        assert!(matches!(
            result,
            Err(VivariumError::Storage(StorageError::SnapshotWriteFailed { .. }))
        ));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Any memory collection SHALL survive a save/load round trip intact,
        /// order included.
        #[test]
        fn prop_memories_round_trip(values in prop::collection::vec(".{0,60}", 0..20)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let store = InMemorySnapshotStore::new();
            let memories: Vec<MemoryEntry> =
                values.into_iter().map(MemoryEntry::new).collect();

            rt.block_on(store.save_memories(&memories)).unwrap();
            let loaded = rt.block_on(store.load_memories()).unwrap().unwrap();
            prop_assert_eq!(loaded, memories);
        }

        /// Agent histories SHALL survive the snapshot round trip.
        #[test]
        fn prop_agent_history_round_trip(contents in prop::collection::vec(".{0,40}", 0..8)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let store = InMemorySnapshotStore::new();

            let mut agent = Agent::new("🦊", "Spark", "Curious");
            let now = chrono::Utc::now();
            for (i, content) in contents.iter().enumerate() {
                let ts = now + chrono::Duration::milliseconds(i as i64);
                if i % 2 == 0 {
                    agent.history.push(vivarium_core::Message::user(content.clone(), ts));
                } else {
                    agent.history.push(vivarium_core::Message::agent(
                        content.clone(),
                        ts,
                        Vec::new(),
                    ));
                }
            }

            let agents = vec![agent];
            rt.block_on(store.save_agents(&agents)).unwrap();
            let loaded = rt.block_on(store.load_agents()).unwrap().unwrap();
            prop_assert_eq!(loaded, agents);
        }
    }
}
