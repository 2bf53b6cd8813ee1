//! eventsync-storage — backends for the collaborators the controller talks to.
//!
//! Backends:
//! - [`queue`] — in-memory job queue engine with per-name worker tasks
//! - [`memory`] — in-memory event-set and global-height stores
//! - [`sqlite`] — SQLite event-set and global-height stores via `sqlx`

pub mod memory;
pub mod queue;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{InMemoryEventSetStore, InMemoryHeightStore};
pub use queue::{InMemoryJobQueue, QueueConfig};
