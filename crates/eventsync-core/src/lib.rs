//! eventsync-core — per-block contract event ingestion, scheduled by a single
//! leader and executed by every worker in the fleet.
//!
//! # Architecture
//!
//! ```text
//! on_module_init ──► JobQueue::register_handler (every process, concurrency 1)
//!        │
//!        └─ leader worker only ──► event_background_fetcher (every tick)
//!                                      ├── HeightSource     (global chain / processed height)
//!                                      ├── JobQueue         (active + waiting jobs)
//!                                      ├── EventSetStore    (idempotency marker lookup)
//!                                      └── JobQueue::enqueue(FetchJob)
//!
//! fetch_evm_events_for_block ◄── any worker picks up the FetchJob
//!        ├── ArtifactContract::fetch_events (block, block)
//!        └── EventSetStore::create (even when empty)
//! ```

pub mod artifact;
pub mod builder;
pub mod config;
pub mod controller;
pub mod converter;
pub mod error;
pub mod fatal;
pub mod height;
pub mod instance;
pub mod queue;
pub mod store;
pub mod types;

pub use artifact::ArtifactContract;
pub use builder::ControllerBuilder;
pub use config::ControllerConfig;
pub use controller::{ControllerHandle, EventController, LastSeenHeights, TickOutcome, JOB_CONCURRENCY};
pub use converter::{ConvertContext, EventConverter, UnconfiguredConverter};
pub use error::SyncError;
pub use fatal::{ExitOnFatal, FatalShutdown, Shutdown};
pub use height::{GlobalHeightRecord, HeightSource, GLOBAL_HEIGHT_ID};
pub use instance::{InstanceIdentity, InstanceSignature, OtherKind, ProcessKind, StaticInstance};
pub use queue::{job_name, FetchJob, Job, JobHandler, JobQueue, JobState, QueuedJob, FETCH_OPERATION};
pub use store::EventSetStore;
pub use types::{ControllerIdentity, EventSetKey, EvmEvent, EvmEventSet, RawLogEntry, RawLogPayload};
