//! Per-event payload conversion seam.
//!
//! How a chain-specific log becomes a domain value is decided per event type.
//! A converter that was never configured must fail loudly: returning nothing
//! would be indistinguishable from a block with no events.

use serde_json::Value;

use crate::error::SyncError;
use crate::types::{ControllerIdentity, RawLogEntry};

/// Context handed to [`EventConverter::convert`].
#[derive(Debug, Clone)]
pub struct ConvertContext {
    pub identity: ControllerIdentity,
    pub block_number: u64,
}

pub trait EventConverter: Send + Sync {
    /// Convert one raw log. The default refuses.
    fn convert(&self, raw: &RawLogEntry, ctx: &ConvertContext) -> Result<Value, SyncError> {
        let _ = raw;
        Err(SyncError::ConverterNotOverridden {
            artifact: ctx.identity.artifact_name.clone(),
            event: ctx.identity.event_name.clone(),
        })
    }
}

/// Converter with no override.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredConverter;

impl EventConverter for UnconfiguredConverter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawLogPayload;

    struct ReturnValues;

    impl EventConverter for ReturnValues {
        fn convert(&self, raw: &RawLogEntry, _ctx: &ConvertContext) -> Result<Value, SyncError> {
            Ok(raw.return_values.clone())
        }
    }

    fn raw() -> RawLogEntry {
        RawLogEntry {
            return_values: serde_json::json!({ "pool": "0x1" }),
            raw: RawLogPayload::default(),
            event: "PoolCreated".into(),
            signature: "0x783c".into(),
            log_index: 0,
            transaction_index: 0,
            transaction_hash: "0x0".into(),
            block_hash: "0x0".into(),
            block_number: 1,
            address: "0x0".into(),
        }
    }

    fn ctx() -> ConvertContext {
        ConvertContext {
            identity: ControllerIdentity::new("UniswapV3Factory", "PoolCreated"),
            block_number: 1,
        }
    }

    #[test]
    fn unconfigured_refuses() {
        let err = UnconfiguredConverter.convert(&raw(), &ctx()).unwrap_err();
        match err {
            SyncError::ConverterNotOverridden { artifact, event } => {
                assert_eq!(artifact, "UniswapV3Factory");
                assert_eq!(event, "PoolCreated");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn override_is_used() {
        let v = ReturnValues.convert(&raw(), &ctx()).unwrap();
        assert_eq!(v["pool"], "0x1");
    }
}
