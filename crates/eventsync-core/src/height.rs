//! Global chain-height record, maintained by the external chain watcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Id of the singleton height record.
pub const GLOBAL_HEIGHT_ID: &str = "global";

/// Chain progress as seen by the watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalHeightRecord {
    /// Highest block observed on chain.
    pub chain_height: u64,
    /// Highest block considered fully handled.
    pub processed_height: u64,
}

impl GlobalHeightRecord {
    pub fn new(chain_height: u64, processed_height: u64) -> Self {
        Self {
            chain_height,
            processed_height,
        }
    }

    /// Either counter still at zero means the watcher has not initialized.
    pub fn is_initialized(&self) -> bool {
        self.chain_height != 0 && self.processed_height != 0
    }

    pub fn is_caught_up(&self) -> bool {
        self.chain_height == self.processed_height
    }
}

/// Read access to the height record store. This crate never writes it.
#[async_trait]
pub trait HeightSource: Send + Sync {
    /// Look up the record with the given id (always [`GLOBAL_HEIGHT_ID`] here).
    async fn search(&self, id: &str) -> Result<Option<GlobalHeightRecord>, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counters_are_uninitialized() {
        assert!(!GlobalHeightRecord::new(0, 0).is_initialized());
        assert!(!GlobalHeightRecord::new(10, 0).is_initialized());
        assert!(!GlobalHeightRecord::new(0, 10).is_initialized());
        assert!(GlobalHeightRecord::new(10, 9).is_initialized());
    }

    #[test]
    fn caught_up() {
        assert!(GlobalHeightRecord::new(100, 100).is_caught_up());
        assert!(!GlobalHeightRecord::new(100, 99).is_caught_up());
    }
}
