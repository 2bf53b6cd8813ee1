//! The per-identity event controller.
//!
//! # Roles
//! Every process registers [`EventController::fetch_evm_events_for_block`] as
//! the consumer of this identity's fetch jobs. Only the elected leader worker
//! also runs [`EventController::event_background_fetcher`] on a fixed
//! interval to decide what to dispatch.
//!
//! # Tick decision
//! 1. Read the global height record. Failure or absence halts the process.
//! 2. Either counter at zero → not ready.
//! 3. `processed == chain` → caught up.
//! 4. A waiting/active job for `chain` under this job name → skip.
//! 5. An event set already stored for `chain` → skip (store failure halts).
//! 6. Enqueue `FetchJob { block_number: chain }`.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactContract;
use crate::config::ControllerConfig;
use crate::converter::{ConvertContext, EventConverter};
use crate::error::SyncError;
use crate::fatal::Shutdown;
use crate::height::{GlobalHeightRecord, HeightSource, GLOBAL_HEIGHT_ID};
use crate::instance::{InstanceIdentity, InstanceSignature};
use crate::queue::{job_name, FetchJob, Job, JobHandler, JobQueue, JobState, FETCH_OPERATION};
use crate::store::EventSetStore;
use crate::types::{ControllerIdentity, EvmEvent, EvmEventSet, RawLogEntry};

/// Fetch jobs of one identity run strictly one at a time.
pub const JOB_CONCURRENCY: usize = 1;

/// What a scheduler tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The chain watcher has not initialized the height counters yet.
    NotReady,
    /// `processed_height == chain_height`.
    CaughtUp { height: u64 },
    /// A job for the target block is already waiting or active.
    AlreadyQueued { block_number: u64 },
    /// An event set for the target block already exists.
    AlreadyStored { block_number: u64 },
    /// A new fetch job was enqueued.
    Dispatched { block_number: u64, job_id: u64 },
}

/// Heights observed on the most recent successful tick.
///
/// Informational only; dispatch decisions never read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastSeenHeights {
    pub chain_height: u64,
    pub processed_height: u64,
}

/// One running instance of the ingestion subsystem for a single
/// `(artifact, event)` identity.
pub struct EventController {
    identity: ControllerIdentity,
    job_name: String,
    config: ControllerConfig,
    artifact: Arc<dyn ArtifactContract>,
    converter: Arc<dyn EventConverter>,
    heights: Arc<dyn HeightSource>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn EventSetStore>,
    instance: Arc<dyn InstanceIdentity>,
    shutdown: Arc<dyn Shutdown>,
    last_seen: Mutex<LastSeenHeights>,
}

impl EventController {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ControllerConfig,
        event_name: String,
        artifact: Arc<dyn ArtifactContract>,
        converter: Arc<dyn EventConverter>,
        heights: Arc<dyn HeightSource>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn EventSetStore>,
        instance: Arc<dyn InstanceIdentity>,
        shutdown: Arc<dyn Shutdown>,
    ) -> Self {
        let identity = ControllerIdentity::new(artifact.artifact_name(), event_name);
        let job_name = job_name(&config.namespace, FETCH_OPERATION, &identity);
        Self {
            identity,
            job_name,
            config,
            artifact,
            converter,
            heights,
            queue,
            store,
            instance,
            shutdown,
            last_seen: Mutex::new(LastSeenHeights::default()),
        }
    }

    // ─── Identity ───────────────────────────────────────────────────────────

    /// Name of the tracked contract type, as reported by the artifact.
    pub fn artifact_name(&self) -> &str {
        &self.identity.artifact_name
    }

    pub fn event_name(&self) -> &str {
        &self.identity.event_name
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    /// Queue name this controller's fetch jobs are addressed to.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns `true` if `(event_name, artifact_name)` is this controller's
    /// identity (exact, case-sensitive).
    pub fn is_handler(&self, event_name: &str, artifact_name: &str) -> bool {
        self.identity.matches(event_name, artifact_name)
    }

    pub fn last_seen(&self) -> LastSeenHeights {
        *self.last_seen.lock().unwrap()
    }

    pub fn convert_context(&self, block_number: u64) -> ConvertContext {
        ConvertContext {
            identity: self.identity.clone(),
            block_number,
        }
    }

    /// Convert a raw log through the configured converter.
    ///
    /// A converter that was never overridden halts the process with the same
    /// error that is returned.
    pub fn convert(&self, raw: &RawLogEntry, ctx: &ConvertContext) -> Result<Value, SyncError> {
        self.converter.convert(raw, ctx).map_err(|err| {
            if err.is_fatal() {
                self.shutdown.halt_with_error(&err);
            }
            err
        })
    }

    /// Fetch this identity's raw logs in `[from_block, to_block]`.
    pub async fn fetch(&self, from_block: u64, to_block: u64) -> Result<Vec<RawLogEntry>, SyncError> {
        self.artifact
            .fetch_events(&self.identity.event_name, from_block, to_block)
            .await
    }

    // ─── Scheduler tick ─────────────────────────────────────────────────────

    /// Run one scheduler tick.
    ///
    /// Fatal errors are handed to the shutdown collaborator before being
    /// returned; other errors only fail this tick.
    pub async fn event_background_fetcher(&self) -> Result<TickOutcome, SyncError> {
        match self.plan_and_dispatch().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if err.is_fatal() {
                    self.shutdown.halt_with_error(&err);
                } else {
                    warn!(
                        artifact = %self.identity.artifact_name,
                        event = %self.identity.event_name,
                        error = %err,
                        "scheduler tick failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn plan_and_dispatch(&self) -> Result<TickOutcome, SyncError> {
        let heights = self.read_heights().await?;
        *self.last_seen.lock().unwrap() = LastSeenHeights {
            chain_height: heights.chain_height,
            processed_height: heights.processed_height,
        };

        if !heights.is_initialized() {
            debug!(
                chain_height = heights.chain_height,
                processed_height = heights.processed_height,
                "height counters not initialized yet"
            );
            return Ok(TickOutcome::NotReady);
        }

        if heights.is_caught_up() {
            return Ok(TickOutcome::CaughtUp {
                height: heights.chain_height,
            });
        }

        let target = heights.chain_height;

        let in_flight = self.queue.list_jobs(&JobState::IN_FLIGHT).await?;
        if in_flight
            .iter()
            .any(|job| job.name == self.job_name && job.data.block_number == target)
        {
            debug!(job_name = %self.job_name, block = target, "fetch already in flight");
            return Ok(TickOutcome::AlreadyQueued {
                block_number: target,
            });
        }

        let hits = self
            .store
            .query(&self.identity.key_at(target))
            .await
            .map_err(|err| match err {
                err if err.is_fatal() => err,
                other => SyncError::StoreQuery(other.to_string()),
            })?;
        if !hits.is_empty() {
            debug!(job_name = %self.job_name, block = target, "event set already stored");
            return Ok(TickOutcome::AlreadyStored {
                block_number: target,
            });
        }

        let job_id = self
            .queue
            .enqueue(&self.job_name, FetchJob { block_number: target })
            .await?;

        info!(
            job_name = %self.job_name,
            job_id,
            block = target,
            processed_height = heights.processed_height,
            "fetch job dispatched"
        );
        Ok(TickOutcome::Dispatched {
            block_number: target,
            job_id,
        })
    }

    async fn read_heights(&self) -> Result<GlobalHeightRecord, SyncError> {
        self.heights
            .search(GLOBAL_HEIGHT_ID)
            .await
            .map_err(|err| match err {
                err if err.is_fatal() => err,
                other => SyncError::HeightUnavailable(other.to_string()),
            })?
            .ok_or_else(|| SyncError::HeightMissing {
                id: GLOBAL_HEIGHT_ID.to_string(),
            })
    }

    // ─── Job handler ────────────────────────────────────────────────────────

    /// Fetch, normalize and persist the events of one block.
    ///
    /// An empty block still persists an empty set. Persistence failures fail
    /// the job; retrying is up to the queue engine.
    pub async fn fetch_evm_events_for_block(&self, job: &Job) -> Result<EvmEventSet, SyncError> {
        let block_number = job.data.block_number;
        job.report_progress(1);

        let mut raw = self.fetch(block_number, block_number).await?;
        let fetched = raw.len();
        raw.retain(|entry| entry.block_number == block_number);
        if raw.len() != fetched {
            warn!(
                job_name = %self.job_name,
                block = block_number,
                dropped = fetched - raw.len(),
                "fetch returned logs outside the requested block"
            );
        }
        job.report_progress(50);

        let set = EvmEventSet {
            artifact_name: self.identity.artifact_name.clone(),
            event_name: self.identity.event_name.clone(),
            block_number,
            events: raw.iter().map(EvmEvent::from).collect(),
        };

        let stored = self.store.create(set).await.map_err(|err| SyncError::Persist {
            artifact: self.identity.artifact_name.clone(),
            event: self.identity.event_name.clone(),
            block_number,
            reason: err.to_string(),
        })?;
        job.report_progress(100);

        info!(
            job_name = %self.job_name,
            job_id = job.id,
            block = block_number,
            events = stored.events.len(),
            "event set persisted"
        );
        Ok(stored)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Register the job handler and, on the leader worker, start the
    /// scheduler tick. Startup failures halt the process.
    pub async fn on_module_init(self: &Arc<Self>) -> Result<ControllerHandle, SyncError> {
        let signature = match self.instance.instance_signature().await {
            Ok(signature) => signature,
            Err(err) => {
                let err = match err {
                    err @ SyncError::Instance(_) => err,
                    other => SyncError::Instance(other.to_string()),
                };
                self.shutdown.halt_with_error(&err);
                return Err(err);
            }
        };

        let handler = Arc::new(FetchJobHandler {
            controller: Arc::downgrade(self),
        });
        if let Err(err) = self
            .queue
            .register_handler(&self.job_name, JOB_CONCURRENCY, handler)
            .await
        {
            let err = match err {
                err @ SyncError::Registration { .. } => err,
                other => SyncError::Registration {
                    job_name: self.job_name.clone(),
                    reason: other.to_string(),
                },
            };
            self.shutdown.halt_with_error(&err);
            return Err(err);
        }

        let scheduler = if signature.runs_scheduler() {
            Some(self.spawn_scheduler())
        } else {
            None
        };

        info!(
            job_name = %self.job_name,
            kind = %signature.kind,
            is_leader = signature.is_leader,
            scheduling = scheduler.is_some(),
            "controller initialized"
        );
        Ok(ControllerHandle {
            signature,
            scheduler,
        })
    }

    fn spawn_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(controller.config.tick_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = controller.event_background_fetcher().await {
                    if err.is_fatal() {
                        break;
                    }
                }
            }
        })
    }
}

/// Handle returned by [`EventController::on_module_init`].
#[derive(Debug)]
pub struct ControllerHandle {
    signature: InstanceSignature,
    scheduler: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn signature(&self) -> &InstanceSignature {
        &self.signature
    }

    /// Returns `true` if this process runs the scheduler tick.
    pub fn is_scheduling(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Returns `true` once the scheduler task has exited (e.g. after a halt).
    pub fn scheduler_finished(&self) -> bool {
        self.scheduler.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the scheduler tick. Registered job handlers are owned by the queue.
    pub fn stop(self) {
        if let Some(task) = self.scheduler {
            task.abort();
        }
    }
}

/// Queue-facing adapter for [`EventController::fetch_evm_events_for_block`].
///
/// Holds a weak reference: the queue must not keep the controller alive.
struct FetchJobHandler {
    controller: Weak<EventController>,
}

#[async_trait]
impl JobHandler for FetchJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), SyncError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| SyncError::Other(format!("controller for job '{}' was dropped", job.name)))?;
        controller.fetch_evm_events_for_block(job).await.map(|_| ())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
