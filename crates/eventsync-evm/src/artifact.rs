//! `EvmArtifact` — a deployed contract exposed as an [`ArtifactContract`].
//!
//! Each registered event is bound to its topic0 and a [`LogDecoder`].
//! Fetching filters `eth_getLogs` by address and topic0, then shapes every
//! live log into a [`RawLogEntry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use eventsync_core::artifact::ArtifactContract;
use eventsync_core::error::SyncError;
use eventsync_core::types::{RawLogEntry, RawLogPayload};

use crate::decoder::{LogDecoder, TopicDecoder};
use crate::fetcher::{EvmFetcher, EvmRpcClient, LogFilter, RawLog};

/// Default block span per `eth_getLogs` call.
pub const DEFAULT_MAX_RANGE: u64 = 2_000;

struct EventBinding {
    topic0: String,
    decoder: Arc<dyn LogDecoder>,
}

pub struct EvmArtifact<C> {
    name: String,
    address: String,
    events: HashMap<String, EventBinding>,
    fetcher: EvmFetcher<C>,
    max_range: u64,
}

impl<C: EvmRpcClient> EvmArtifact<C> {
    pub fn new(name: impl Into<String>, address: impl Into<String>, client: C) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            events: HashMap::new(),
            fetcher: EvmFetcher::new(client),
            max_range: DEFAULT_MAX_RANGE,
        }
    }

    /// Bind an event name to its topic0, decoded with a positional [`TopicDecoder`].
    pub fn event(self, name: impl Into<String>, topic0: impl Into<String>) -> Self {
        self.event_with_decoder(name, topic0, Arc::new(TopicDecoder::default()))
    }

    pub fn event_with_decoder(
        mut self,
        name: impl Into<String>,
        topic0: impl Into<String>,
        decoder: Arc<dyn LogDecoder>,
    ) -> Self {
        self.events.insert(
            name.into(),
            EventBinding {
                topic0: topic0.into().to_lowercase(),
                decoder,
            },
        );
        self
    }

    pub fn max_range(mut self, blocks: u64) -> Self {
        self.max_range = blocks.max(1);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// topic0 bound to `event_name`, if registered.
    pub fn topic0(&self, event_name: &str) -> Option<&str> {
        self.events.get(event_name).map(|b| b.topic0.as_str())
    }

    fn to_entry(&self, event_name: &str, binding: &EventBinding, log: RawLog) -> Result<RawLogEntry, SyncError> {
        let return_values = binding.decoder.decode(&log)?;
        Ok(RawLogEntry {
            return_values,
            event: event_name.to_string(),
            signature: binding.topic0.clone(),
            log_index: log.log_index_u32()?,
            transaction_index: log.tx_index_u32()?,
            block_number: log.block_number_u64()?,
            transaction_hash: log.tx_hash,
            block_hash: log.block_hash,
            address: log.address,
            raw: RawLogPayload {
                data: log.data,
                topics: log.topics,
            },
        })
    }
}

#[async_trait]
impl<C: EvmRpcClient> ArtifactContract for EvmArtifact<C> {
    fn artifact_name(&self) -> &str {
        &self.name
    }

    async fn fetch_events(
        &self,
        event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEntry>, SyncError> {
        let binding = self.events.get(event_name).ok_or_else(|| {
            SyncError::Other(format!("event '{event_name}' is not bound on artifact '{}'", self.name))
        })?;
        let filter = LogFilter {
            address: Some(self.address.clone()),
            topic0: Some(binding.topic0.clone()),
        };

        let logs = self.fetcher.logs(from_block, to_block, &filter, self.max_range).await?;
        debug!(
            artifact = %self.name,
            event = event_name,
            from = from_block,
            to = to_block,
            count = logs.len(),
            "fetched logs"
        );

        logs.into_iter()
            .filter(|log| log.topic0().map(str::to_lowercase).as_deref() == Some(binding.topic0.as_str()))
            .map(|log| self.to_entry(event_name, binding, log))
            .collect()
    }
}
