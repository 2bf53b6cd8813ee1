//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! One `eth_getLogs` POST per call; range chunking stays in [`EvmFetcher`].
//! Transport and node errors surface as [`SyncError::Rpc`], so the queue's
//! retry policy decides whether the block is attempted again.
//!
//! [`EvmFetcher`]: crate::fetcher::EvmFetcher

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use eventsync_core::error::SyncError;

use crate::fetcher::{EvmRpcClient, LogFilter, RawLog};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `eth_getLogs` over HTTP.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// JSON-RPC request body for `eth_getLogs` over `[from, to]`.
pub fn logs_request(id: u64, from: u64, to: u64, filter: &LogFilter) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_getLogs",
        "params": filter.to_params(from, to),
    })
}

/// Extract the log list from a JSON-RPC response body.
pub fn parse_logs_response(body: Value) -> Result<Vec<RawLog>, SyncError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(SyncError::Rpc(format!("eth_getLogs failed ({code}): {message}")));
    }
    let result = match body.get("result") {
        Some(result) if !result.is_null() => result.clone(),
        _ => return Err(SyncError::Rpc("eth_getLogs response has no result".into())),
    };
    serde_json::from_value(result)
        .map_err(|e| SyncError::Rpc(format!("malformed eth_getLogs result: {e}")))
}

#[async_trait]
impl EvmRpcClient for HttpRpcClient {
    async fn get_logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, SyncError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .http
            .post(&self.url)
            .json(&logs_request(id, from, to, filter))
            .send()
            .await
            .map_err(|e| SyncError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Rpc(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp.json().await.map_err(|e| SyncError::Rpc(e.to_string()))?;
        let logs = parse_logs_response(body)?;
        debug!(url = %self.url, from, to, count = logs.len(), "eth_getLogs");
        Ok(logs)
    }
}
