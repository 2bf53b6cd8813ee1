//! In-memory storage backends.
//!
//! Event sets and the global height record live in RAM. Useful for tests,
//! the CLI's dry runs and single-process deployments that don't need
//! persistence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use eventsync_core::error::SyncError;
use eventsync_core::height::{GlobalHeightRecord, HeightSource, GLOBAL_HEIGHT_ID};
use eventsync_core::store::EventSetStore;
use eventsync_core::types::{EventSetKey, EvmEventSet};

// ─── Event sets ───────────────────────────────────────────────────────────────

/// In-memory event-set store keyed by `(artifact, event, block)`.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryEventSetStore {
    sets: Mutex<BTreeMap<EventSetKey, EvmEventSet>>,
}

impl InMemoryEventSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a set by key.
    pub fn get(&self, key: &EventSetKey) -> Option<EvmEventSet> {
        self.sets.lock().unwrap().get(key).cloned()
    }

    /// All sets of one identity, ordered by block number.
    pub fn sets_for(&self, artifact_name: &str, event_name: &str) -> Vec<EvmEventSet> {
        self.sets
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.artifact_name == artifact_name && s.event_name == event_name)
            .cloned()
            .collect()
    }

    /// Number of stored sets.
    pub fn len(&self) -> usize {
        self.sets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSetStore for InMemoryEventSetStore {
    async fn query(&self, key: &EventSetKey) -> Result<Vec<EvmEventSet>, SyncError> {
        Ok(self.get(key).into_iter().collect())
    }

    async fn create(&self, set: EvmEventSet) -> Result<EvmEventSet, SyncError> {
        let replaced = self.sets.lock().unwrap().insert(set.key(), set.clone());
        if replaced.is_some() {
            tracing::debug!(
                artifact = %set.artifact_name,
                event = %set.event_name,
                block = set.block_number,
                "event set overwritten"
            );
        }
        Ok(set)
    }
}

// ─── Global height ────────────────────────────────────────────────────────────

/// In-memory global height record. The chain watcher (or a test) writes it
/// through [`InMemoryHeightStore::set`].
#[derive(Default)]
pub struct InMemoryHeightStore {
    record: RwLock<Option<GlobalHeightRecord>>,
}

impl InMemoryHeightStore {
    /// An empty store: searches return `None` until [`set`](Self::set) is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heights(chain_height: u64, processed_height: u64) -> Self {
        let store = Self::new();
        store.set(chain_height, processed_height);
        store
    }

    /// Upsert the global record.
    pub fn set(&self, chain_height: u64, processed_height: u64) {
        *self.record.write().unwrap() = Some(GlobalHeightRecord::new(chain_height, processed_height));
    }

    /// Remove the global record.
    pub fn clear(&self) {
        *self.record.write().unwrap() = None;
    }
}

#[async_trait]
impl HeightSource for InMemoryHeightStore {
    async fn search(&self, id: &str) -> Result<Option<GlobalHeightRecord>, SyncError> {
        if id != GLOBAL_HEIGHT_ID {
            return Ok(None);
        }
        Ok(*self.record.read().unwrap())
    }
}
