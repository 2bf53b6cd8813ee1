//! Log decoding: raw topics and data into named return values.

use serde_json::{Map, Value};

use eventsync_core::error::SyncError;

use crate::fetcher::RawLog;

/// Turns a raw log into the decoded `returnValues` object.
///
/// Full ABI decoding lives outside this crate; implement this trait to plug
/// in a real decoder.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, log: &RawLog) -> Result<Value, SyncError>;
}

/// Maps indexed topics (after topic0) to parameter names and passes the
/// data field through untouched.
///
/// Unnamed topics are keyed by their position, so `TopicDecoder::default()`
/// yields `{"0": topic1, "1": topic2, ..., "data": "0x..."}`.
#[derive(Debug, Clone, Default)]
pub struct TopicDecoder {
    indexed: Vec<String>,
}

impl TopicDecoder {
    pub fn new<I, S>(indexed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            indexed: indexed.into_iter().map(Into::into).collect(),
        }
    }
}

impl LogDecoder for TopicDecoder {
    fn decode(&self, log: &RawLog) -> Result<Value, SyncError> {
        let mut values = Map::new();
        for (i, topic) in log.topics.iter().skip(1).enumerate() {
            let key = self.indexed.get(i).cloned().unwrap_or_else(|| i.to_string());
            values.insert(key, Value::String(topic.clone()));
        }
        values.insert("data".into(), Value::String(log.data.clone()));
        Ok(Value::Object(values))
    }
}
