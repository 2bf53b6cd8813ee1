//! EVM log fetcher.
//!
//! Uses JSON-RPC `eth_getLogs` with range batching. Logs flagged `removed`
//! by the node are dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use eventsync_core::error::SyncError;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "transactionIndex")]
    pub tx_index: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "removed", default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, SyncError> {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> Result<u32, SyncError> {
        parse_hex_u32(&self.log_index)
    }

    pub fn tx_index_u32(&self) -> Result<u32, SyncError> {
        parse_hex_u32(&self.tx_index)
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// `eth_getLogs` filter for one contract event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Contract address (empty = all addresses).
    pub address: Option<String>,
    /// topic0 (event signature hash).
    pub topic0: Option<String>,
}

impl LogFilter {
    /// JSON-RPC params for `eth_getLogs` over `[from, to]`.
    pub fn to_params(&self, from: u64, to: u64) -> Vec<Value> {
        let mut obj = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        if let Some(address) = &self.address {
            obj["address"] = json!(address);
        }
        if let Some(topic0) = &self.topic0 {
            obj["topics"] = json!([topic0]);
        }
        vec![obj]
    }
}

/// Trait for fetching EVM logs from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, SyncError>;
}

/// EVM fetcher that wraps an `EvmRpcClient` and adds batching logic.
pub struct EvmFetcher<C> {
    client: C,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch all live logs in `[from, to]` matching the filter, splitting the
    /// range into chunks of at most `max_range + 1` blocks.
    pub async fn logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
        max_range: u64,
    ) -> Result<Vec<RawLog>, SyncError> {
        if to < from {
            return Ok(vec![]);
        }
        let mut all_logs = Vec::new();
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(max_range).min(to);
            let chunk = self.client.get_logs(start, end, filter).await?;
            all_logs.extend(chunk.into_iter().filter(|log| !log.is_removed()));
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(all_logs)
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, SyncError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| SyncError::Rpc(format!("invalid hex quantity '{s}': {e}")))
}

fn parse_hex_u32(s: &str) -> Result<u32, SyncError> {
    let v = parse_hex_u64(s)?;
    u32::try_from(v).map_err(|_| SyncError::Rpc(format!("hex quantity '{s}' out of range")))
}
