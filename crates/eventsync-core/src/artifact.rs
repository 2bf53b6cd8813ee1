//! Contract artifact collaborator: names the tracked contract type and
//! fetches its raw logs from the chain node.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::RawLogEntry;

#[async_trait]
pub trait ArtifactContract: Send + Sync {
    /// Name of the contract type (e.g. `"UniswapV3Factory"`).
    fn artifact_name(&self) -> &str;

    /// Fetch `event_name` logs in `[from_block, to_block]`.
    async fn fetch_events(
        &self,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEntry>, SyncError>;
}
