//! In-memory job queue engine.
//!
//! Jobs are grouped by name. Registering a handler for a name spawns
//! `concurrency` worker tasks that claim the oldest waiting job of that name,
//! run it, and record the result. Failed jobs are re-queued until
//! `max_attempts` is reached. A handler panic counts as a failed attempt.
//!
//! Finished jobs are kept for inspection up to `keep_completed` /
//! `keep_failed` records; older ones are evicted.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use eventsync_core::error::SyncError;
use eventsync_core::queue::{FetchJob, Job, JobHandler, JobQueue, JobState, QueuedJob};

/// Retry and retention policy of the queue engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Total attempts per job, first run included. 1 = never retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Completed jobs kept for inspection, newest first. 0 = drop on completion.
    #[serde(default = "default_keep_finished")]
    pub keep_completed: usize,
    /// Failed jobs kept for inspection, newest first.
    #[serde(default = "default_keep_finished")]
    pub keep_failed: usize,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_keep_finished() -> usize {
    1_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            keep_completed: default_keep_finished(),
            keep_failed: default_keep_finished(),
        }
    }
}

struct JobRecord {
    id: u64,
    name: String,
    data: FetchJob,
    state: JobState,
    attempts: u32,
    progress: Arc<AtomicU8>,
    failed_reason: Option<String>,
    enqueued_at: DateTime<Utc>,
}

impl JobRecord {
    fn snapshot(&self) -> QueuedJob {
        QueuedJob {
            id: self.id,
            name: self.name.clone(),
            data: self.data,
            state: self.state,
            attempts: self.attempts,
            progress: self.progress.load(Ordering::Relaxed),
            failed_reason: self.failed_reason.clone(),
            enqueued_at: self.enqueued_at,
        }
    }
}

struct Lane {
    notify: Arc<Notify>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    jobs: BTreeMap<u64, JobRecord>,
    lanes: HashMap<String, Lane>,
}

struct QueueInner {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl QueueInner {
    /// Mark the oldest waiting job of `name` active and hand it out.
    fn claim(&self, name: &str) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .jobs
            .values_mut()
            .find(|r| r.name == name && r.state == JobState::Waiting)?;
        record.state = JobState::Active;
        record.attempts += 1;
        Some(Job::with_progress(
            record.id,
            record.name.clone(),
            record.data,
            record.attempts,
            record.progress.clone(),
        ))
    }

    fn finish(&self, id: u64, result: Result<(), SyncError>) {
        let mut state = self.state.lock().unwrap();
        let max_attempts = self.config.max_attempts;
        let Some(record) = state.jobs.get_mut(&id) else {
            return;
        };

        let retry_lane = match result {
            Ok(()) => {
                record.state = JobState::Completed;
                record.failed_reason = None;
                debug!(job_id = id, job_name = %record.name, "job completed");
                None
            }
            Err(err) => {
                record.failed_reason = Some(err.to_string());
                if record.attempts < max_attempts {
                    record.state = JobState::Waiting;
                    warn!(
                        job_id = id,
                        job_name = %record.name,
                        attempt = record.attempts,
                        max_attempts,
                        error = %err,
                        "job failed; re-queued"
                    );
                    Some(record.name.clone())
                } else {
                    record.state = JobState::Failed;
                    warn!(
                        job_id = id,
                        job_name = %record.name,
                        attempts = record.attempts,
                        error = %err,
                        "job failed"
                    );
                    None
                }
            }
        };

        if let Some(name) = retry_lane {
            if let Some(lane) = state.lanes.get(&name) {
                lane.notify.notify_one();
            }
        }

        evict(&mut state.jobs, JobState::Completed, self.config.keep_completed);
        evict(&mut state.jobs, JobState::Failed, self.config.keep_failed);
    }
}

/// Drop the oldest records in `finished` beyond `keep`. Ids grow
/// monotonically, so map order is age order.
fn evict(jobs: &mut BTreeMap<u64, JobRecord>, finished: JobState, keep: usize) {
    let ids: Vec<u64> = jobs
        .values()
        .filter(|r| r.state == finished)
        .map(|r| r.id)
        .collect();
    if ids.len() <= keep {
        return;
    }
    let excess = ids.len() - keep;
    for id in &ids[..excess] {
        jobs.remove(id);
    }
    debug!(state = %finished, evicted = excess, "finished jobs evicted");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// In-memory implementation of [`JobQueue`].
///
/// Must be used from within a Tokio runtime: registration spawns tasks.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    inner: Arc<QueueInner>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl InMemoryJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    /// Snapshot of one job.
    pub fn job(&self, id: u64) -> Option<QueuedJob> {
        self.inner.state.lock().unwrap().jobs.get(&id).map(JobRecord::snapshot)
    }

    /// Snapshot of every job named `name`, oldest first.
    pub fn jobs_named(&self, name: &str) -> Vec<QueuedJob> {
        self.inner
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|r| r.name == name)
            .map(JobRecord::snapshot)
            .collect()
    }

    /// Number of jobs in `state` across all names.
    pub fn count(&self, state: JobState) -> usize {
        self.inner
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|r| r.state == state)
            .count()
    }

    /// Returns `true` if a handler is registered for `name`.
    pub fn has_handler(&self, name: &str) -> bool {
        self.inner.state.lock().unwrap().lanes.contains_key(name)
    }

    /// Number of job records currently held, finished ones included.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every worker task. Jobs that were active stay active.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        for (_, lane) in state.lanes.drain() {
            for worker in lane.workers {
                worker.abort();
            }
        }
    }
}

async fn run_worker(
    inner: Arc<QueueInner>,
    name: String,
    notify: Arc<Notify>,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        let Some(job) = inner.claim(&name) else {
            notify.notified().await;
            continue;
        };
        debug!(job_id = job.id, job_name = %name, attempt = job.attempt, "job started");
        let result = match AssertUnwindSafe(handler.handle(&job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let panic_msg = panic_message(panic.as_ref());
                error!(job_id = job.id, job_name = %name, panic = %panic_msg, "job handler panicked");
                Err(SyncError::Other(format!("handler panicked: {panic_msg}")))
            }
        };
        inner.finish(job.id, result);
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, name: &str, data: FetchJob) -> Result<u64, SyncError> {
        let mut state = self.inner.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.jobs.insert(
            id,
            JobRecord {
                id,
                name: name.to_string(),
                data,
                state: JobState::Waiting,
                attempts: 0,
                progress: Arc::new(AtomicU8::new(0)),
                failed_reason: None,
                enqueued_at: Utc::now(),
            },
        );
        if let Some(lane) = state.lanes.get(name) {
            lane.notify.notify_one();
        }
        debug!(job_id = id, job_name = %name, block = data.block_number, "job enqueued");
        Ok(id)
    }

    async fn list_jobs(&self, states: &[JobState]) -> Result<Vec<QueuedJob>, SyncError> {
        Ok(self
            .inner
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|r| states.contains(&r.state))
            .map(JobRecord::snapshot)
            .collect())
    }

    async fn register_handler(
        &self,
        name: &str,
        concurrency: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), SyncError> {
        if concurrency == 0 {
            return Err(SyncError::Registration {
                job_name: name.to_string(),
                reason: "concurrency must be at least 1".into(),
            });
        }

        let mut state = self.inner.state.lock().unwrap();
        if state.lanes.contains_key(name) {
            return Err(SyncError::Registration {
                job_name: name.to_string(),
                reason: "a handler is already registered".into(),
            });
        }

        let notify = Arc::new(Notify::new());
        let workers = (0..concurrency)
            .map(|_| {
                tokio::spawn(run_worker(
                    Arc::clone(&self.inner),
                    name.to_string(),
                    notify.clone(),
                    handler.clone(),
                ))
            })
            .collect();
        state.lanes.insert(name.to_string(), Lane { notify, workers });

        debug!(job_name = %name, concurrency, "handler registered");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
