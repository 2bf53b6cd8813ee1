//! Error types for the event sync pipeline.

use thiserror::Error;

/// Errors raised by the controller and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Global height record could not be read: {0}")]
    HeightUnavailable(String),

    #[error("Global height record '{id}' not found")]
    HeightMissing { id: String },

    #[error("Event set store query failed: {0}")]
    StoreQuery(String),

    #[error("Storage backend unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Failed to persist event set for {artifact}/{event} at block {block_number}: {reason}")]
    Persist {
        artifact: String,
        event: String,
        block_number: u64,
        reason: String,
    },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Failed to register handler for job '{job_name}': {reason}")]
    Registration { job_name: String, reason: String },

    #[error("convert() must be overridden for artifact '{artifact}' event '{event}'")]
    ConverterNotOverridden { artifact: String, event: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Instance identity unavailable: {0}")]
    Instance(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` if the error must halt the process.
    ///
    /// Startup/configuration errors, an unreachable storage backend and failed reads of chain progress or the
    /// idempotency store are fatal. Persistence, queue and RPC errors stay
    /// scoped to the job or tick that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HeightUnavailable(_)
                | Self::HeightMissing { .. }
                | Self::StoreQuery(_)
                | Self::StoreUnavailable(_)
                | Self::Registration { .. }
                | Self::ConverterNotOverridden { .. }
                | Self::Instance(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(SyncError::HeightMissing { id: "global".into() }.is_fatal());
        assert!(SyncError::StoreQuery("down".into()).is_fatal());
        assert!(SyncError::StoreUnavailable("no such file".into()).is_fatal());
        assert!(SyncError::ConverterNotOverridden {
            artifact: "Factory".into(),
            event: "Created".into(),
        }
        .is_fatal());

        assert!(!SyncError::Queue("busy".into()).is_fatal());
        assert!(!SyncError::Rpc("timeout".into()).is_fatal());
        assert!(!SyncError::Persist {
            artifact: "Factory".into(),
            event: "Created".into(),
            block_number: 1,
            reason: "conflict".into(),
        }
        .is_fatal());
    }

    #[test]
    fn converter_message_names_identity() {
        let err = SyncError::ConverterNotOverridden {
            artifact: "ERC721".into(),
            event: "Transfer".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ERC721"));
        assert!(msg.contains("Transfer"));
    }
}
