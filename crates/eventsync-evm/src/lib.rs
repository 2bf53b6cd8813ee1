//! eventsync-evm — EVM log fetcher and contract artifact adapter.

pub mod artifact;
pub mod decoder;
pub mod fetcher;

#[cfg(feature = "http")]
pub mod http;

pub use artifact::EvmArtifact;
pub use decoder::{LogDecoder, TopicDecoder};
pub use fetcher::{EvmFetcher, EvmRpcClient, LogFilter, RawLog};

#[cfg(feature = "http")]
pub use http::HttpRpcClient;
