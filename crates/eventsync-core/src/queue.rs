//! Job queue collaborator: fetch-job payloads, job snapshots, handler trait.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::types::ControllerIdentity;

/// Operation segment of fetch-job names.
pub const FETCH_OPERATION: &str = "fetch-evm-events-for-block";

/// Deterministic job name for one controller identity.
///
/// `namespace:operation:artifact:event`, so distinct identities never collide.
pub fn job_name(namespace: &str, operation: &str, identity: &ControllerIdentity) -> String {
    format!(
        "{namespace}:{operation}:{}:{}",
        identity.artifact_name, identity.event_name
    )
}

/// Payload of a fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchJob {
    pub block_number: u64,
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// States that count as "in flight" for duplicate suppression.
    pub const IN_FLIGHT: [JobState; 2] = [JobState::Active, JobState::Waiting];
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a job as listed by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: u64,
    pub name: String,
    pub data: FetchJob,
    pub state: JobState,
    pub attempts: u32,
    pub progress: u8,
    pub failed_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// A job handed to a [`JobHandler`].
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub data: FetchJob,
    /// 1-based attempt counter.
    pub attempt: u32,
    progress: Arc<AtomicU8>,
}

impl Job {
    pub fn new(id: u64, name: impl Into<String>, data: FetchJob) -> Self {
        Self::with_progress(id, name, data, 1, Arc::new(AtomicU8::new(0)))
    }

    /// Build a job whose progress is shared with the queue's record.
    pub fn with_progress(
        id: u64,
        name: impl Into<String>,
        data: FetchJob,
        attempt: u32,
        progress: Arc<AtomicU8>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            data,
            attempt,
            progress,
        }
    }

    /// Record progress (0-100). Observability only.
    pub fn report_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
        tracing::trace!(job_id = self.id, job_name = %self.name, percent, "job progress");
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }
}

/// Consumer of dispatched jobs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), SyncError>;
}

/// The durable job queue engine.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job under `name`; returns the job id.
    async fn enqueue(&self, name: &str, data: FetchJob) -> Result<u64, SyncError>;

    /// List jobs of every name currently in one of `states`.
    async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<QueuedJob>, SyncError>;

    /// Consume jobs named `name` with at most `concurrency` running at once.
    async fn register_handler(
        &self,
        name: &str,
        concurrency: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), SyncError>;
}
