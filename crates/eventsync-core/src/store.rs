//! Persisted event-set store (the search/index collaborator).

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::{EventSetKey, EvmEventSet};

/// Trait for querying and appending event sets.
///
/// Implementations include `InMemoryEventSetStore` and, behind the `sqlite`
/// feature, `SqliteStorage` (both in `eventsync-storage`).
#[async_trait]
pub trait EventSetStore: Send + Sync {
    /// Return every stored set matching `key` (normally zero or one).
    async fn query(&self, key: &EventSetKey) -> Result<Vec<EvmEventSet>, SyncError>;

    /// Create a set. A second create for the same key must not corrupt state;
    /// implementations overwrite the existing row.
    async fn create(&self, set: EvmEventSet) -> Result<EvmEventSet, SyncError>;
}
