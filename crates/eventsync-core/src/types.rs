//! Shared types for the event sync pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── ControllerIdentity ───────────────────────────────────────────────────────

/// The `(artifact, event)` pair identifying one controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerIdentity {
    /// Contract artifact name (e.g. `"UniswapV3Factory"`).
    pub artifact_name: String,
    /// Event name emitted by the artifact (e.g. `"PoolCreated"`).
    pub event_name: String,
}

impl ControllerIdentity {
    pub fn new(artifact_name: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            event_name: event_name.into(),
        }
    }

    /// Exact, case-sensitive match on both names.
    pub fn matches(&self, event_name: &str, artifact_name: &str) -> bool {
        self.event_name == event_name && self.artifact_name == artifact_name
    }

    /// Store key for this identity at `block_number`.
    pub fn key_at(&self, block_number: u64) -> EventSetKey {
        EventSetKey {
            artifact_name: self.artifact_name.clone(),
            event_name: self.event_name.clone(),
            block_number,
        }
    }
}

impl std::fmt::Display for ControllerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.artifact_name, self.event_name)
    }
}

// ─── Raw log entries ──────────────────────────────────────────────────────────

/// Undecoded log payload, copied verbatim from the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogPayload {
    /// Non-indexed data (`0x…`).
    pub data: String,
    /// Ordered topics, topic0 first.
    pub topics: Vec<String>,
}

/// A log entry as returned by the artifact's fetch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    /// Decoded event arguments.
    pub return_values: Value,
    pub raw: RawLogPayload,
    /// Event name.
    pub event: String,
    /// Event signature hash (`0x…`).
    pub signature: String,
    pub log_index: u32,
    pub transaction_index: u32,
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    /// Emitting contract address.
    pub address: String,
}

// ─── EvmEvent / EvmEventSet ───────────────────────────────────────────────────

/// One normalized event. Has no identity outside its [`EvmEventSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmEvent {
    /// Decoded arguments serialized as a JSON string.
    pub return_values_json: String,
    pub raw_data: String,
    pub raw_topics: Vec<String>,
    pub event_name: String,
    pub signature: String,
    pub log_index: u32,
    pub transaction_index: u32,
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub contract_address: String,
}

impl From<&RawLogEntry> for EvmEvent {
    fn from(raw: &RawLogEntry) -> Self {
        Self {
            return_values_json: raw.return_values.to_string(),
            raw_data: raw.raw.data.clone(),
            raw_topics: raw.raw.topics.clone(),
            event_name: raw.event.clone(),
            signature: raw.signature.clone(),
            log_index: raw.log_index,
            transaction_index: raw.transaction_index,
            transaction_hash: raw.transaction_hash.clone(),
            block_hash: raw.block_hash.clone(),
            block_number: raw.block_number,
            contract_address: raw.address.clone(),
        }
    }
}

/// Natural key of an [`EvmEventSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSetKey {
    pub artifact_name: String,
    pub event_name: String,
    pub block_number: u64,
}

/// All events of one identity at one block.
///
/// Its existence marks the block as examined, even with zero events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmEventSet {
    pub artifact_name: String,
    pub event_name: String,
    pub block_number: u64,
    pub events: Vec<EvmEvent>,
}

impl EvmEventSet {
    pub fn key(&self) -> EventSetKey {
        EventSetKey {
            artifact_name: self.artifact_name.clone(),
            event_name: self.event_name.clone(),
            block_number: self.block_number,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_entry() -> RawLogEntry {
        RawLogEntry {
            return_values: json!({ "owner": "0xabc", "tokenId": "7" }),
            raw: RawLogPayload {
                data: "0x01".into(),
                topics: vec!["0xddf2".into(), "0x0001".into()],
            },
            event: "Transfer".into(),
            signature: "0xddf2".into(),
            log_index: 3,
            transaction_index: 9,
            transaction_hash: "0xtx".into(),
            block_hash: "0xblock".into(),
            block_number: 100,
            address: "0xcontract".into(),
        }
    }

    #[test]
    fn identity_match_is_case_sensitive() {
        let id = ControllerIdentity::new("ERC721", "Transfer");
        assert!(id.matches("Transfer", "ERC721"));
        assert!(!id.matches("transfer", "ERC721"));
        assert!(!id.matches("Transfer", "erc721"));
        assert!(!id.matches("ERC721", "Transfer"));
    }

    #[test]
    fn event_copies_raw_fields() {
        let raw = raw_entry();
        let ev = EvmEvent::from(&raw);
        assert_eq!(ev.return_values_json, r#"{"owner":"0xabc","tokenId":"7"}"#);
        assert_eq!(ev.raw_data, "0x01");
        assert_eq!(ev.raw_topics, vec!["0xddf2".to_string(), "0x0001".to_string()]);
        assert_eq!(ev.log_index, 3);
        assert_eq!(ev.transaction_index, 9);
        assert_eq!(ev.contract_address, "0xcontract");
        assert_eq!(ev.block_number, 100);
    }

    #[test]
    fn event_set_serializes_camel_case() {
        let set = EvmEventSet {
            artifact_name: "ERC721".into(),
            event_name: "Transfer".into(),
            block_number: 5,
            events: vec![],
        };
        let v = serde_json::to_value(&set).unwrap();
        assert_eq!(v["artifactName"], "ERC721");
        assert_eq!(v["blockNumber"], 5);
        assert!(v["events"].as_array().unwrap().is_empty());
    }
}
