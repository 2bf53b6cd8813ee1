//! End-to-end tests: controller lifecycle against the in-memory queue engine
//! and stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use eventsync_core::{
    ArtifactContract, ControllerBuilder, EventController, EventSetKey, EventSetStore, EvmEventSet,
    FatalShutdown, FetchJob, JobQueue, JobState, RawLogEntry, RawLogPayload, StaticInstance,
    SyncError, TickOutcome,
};
use eventsync_storage::{InMemoryEventSetStore, InMemoryHeightStore, InMemoryJobQueue, QueueConfig};

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct Factory {
    name: &'static str,
    logs: Mutex<HashMap<u64, Vec<RawLogEntry>>>,
}

impl Factory {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            logs: Mutex::new(HashMap::new()),
        })
    }

    fn emit(&self, block: u64, log_index: u32) {
        self.logs.lock().unwrap().entry(block).or_default().push(RawLogEntry {
            return_values: json!({ "pool": format!("0xpool{log_index}") }),
            raw: RawLogPayload {
                data: "0x".into(),
                topics: vec!["0x783cca1c".into()],
            },
            event: "PoolCreated".into(),
            signature: "0x783cca1c".into(),
            log_index,
            transaction_index: 0,
            transaction_hash: format!("0xtx{block}"),
            block_hash: format!("0xblock{block}"),
            block_number: block,
            address: "0xfactory".into(),
        });
    }
}

#[async_trait]
impl ArtifactContract for Factory {
    fn artifact_name(&self) -> &str {
        self.name
    }

    async fn fetch_events(
        &self,
        _event_name: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEntry>, SyncError> {
        let logs = self.logs.lock().unwrap();
        Ok((from_block..=to_block)
            .flat_map(|b| logs.get(&b).cloned().unwrap_or_default())
            .collect())
    }
}

/// Rejects the first `failures` creates.
struct FlakyStore {
    inner: InMemoryEventSetStore,
    failures: AtomicU32,
}

#[async_trait]
impl EventSetStore for FlakyStore {
    async fn query(&self, key: &EventSetKey) -> Result<Vec<EvmEventSet>, SyncError> {
        self.inner.query(key).await
    }

    async fn create(&self, set: EvmEventSet) -> Result<EvmEventSet, SyncError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SyncError::Other("bulk index rejected".into()));
        }
        self.inner.create(set).await
    }
}

struct Fleet {
    queue: Arc<InMemoryJobQueue>,
    store: Arc<InMemoryEventSetStore>,
    heights: Arc<InMemoryHeightStore>,
    shutdown: FatalShutdown,
}

impl Fleet {
    fn new(queue: InMemoryJobQueue) -> Self {
        Self {
            queue: Arc::new(queue),
            store: Arc::new(InMemoryEventSetStore::new()),
            heights: Arc::new(InMemoryHeightStore::new()),
            shutdown: FatalShutdown::new(),
        }
    }

    fn controller(
        &self,
        artifact: Arc<Factory>,
        store: Arc<dyn EventSetStore>,
        instance: StaticInstance,
    ) -> Arc<EventController> {
        let controller = ControllerBuilder::new()
            .event_name("PoolCreated")
            .tick_interval_ms(10)
            .artifact(artifact)
            .heights(self.heights.clone())
            .queue(self.queue.clone())
            .store(store)
            .instance(Arc::new(instance))
            .shutdown(Arc::new(self.shutdown.clone()))
            .build()
            .unwrap();
        Arc::new(controller)
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn key(artifact: &str, block: u64) -> EventSetKey {
    EventSetKey {
        artifact_name: artifact.into(),
        event_name: "PoolCreated".into(),
        block_number: block,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn leader_dispatches_and_worker_persists_once() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let factory = Factory::new("UniswapV3Factory");
    factory.emit(100, 0);
    factory.emit(100, 1);
    fleet.heights.set(100, 99);

    let controller = fleet.controller(factory, fleet.store.clone(), StaticInstance::leader());
    let handle = controller.on_module_init().await.unwrap();
    assert!(handle.is_scheduling());

    let store = fleet.store.clone();
    wait_until("block 100 stored", || store.get(&key("UniswapV3Factory", 100)).is_some()).await;

    // Several more ticks run; the stored marker keeps them from re-dispatching.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let jobs = fleet.queue.jobs_named(controller.job_name());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].data, FetchJob { block_number: 100 });

    let set = fleet.store.get(&key("UniswapV3Factory", 100)).unwrap();
    assert_eq!(set.events.len(), 2);
    assert_eq!(set.events[1].return_values_json, r#"{"pool":"0xpool1"}"#);
    assert_eq!(
        controller.event_background_fetcher().await.unwrap(),
        TickOutcome::AlreadyStored { block_number: 100 }
    );

    handle.stop();
    fleet.queue.close();
}

#[tokio::test]
async fn chain_advance_dispatches_next_block_in_order() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let factory = Factory::new("UniswapV3Factory");
    fleet.heights.set(100, 99);

    let controller = fleet.controller(factory, fleet.store.clone(), StaticInstance::leader());
    let handle = controller.on_module_init().await.unwrap();

    let store = fleet.store.clone();
    wait_until("block 100 stored", || store.get(&key("UniswapV3Factory", 100)).is_some()).await;

    fleet.heights.set(101, 100);
    wait_until("block 101 stored", || store.get(&key("UniswapV3Factory", 101)).is_some()).await;

    let blocks: Vec<u64> = fleet
        .queue
        .jobs_named(controller.job_name())
        .iter()
        .map(|j| j.data.block_number)
        .collect();
    assert_eq!(blocks, vec![100, 101]);

    // Empty blocks still leave a marker.
    assert!(fleet.store.sets_for("UniswapV3Factory", "PoolCreated").iter().all(|s| s.events.is_empty()));

    fleet.heights.set(101, 101);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(fleet.queue.jobs_named(controller.job_name()).len(), 2);

    handle.stop();
    fleet.queue.close();
}

#[tokio::test]
async fn follower_executes_jobs_but_never_dispatches() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let factory = Factory::new("PoolDeployer");
    factory.emit(55, 3);
    fleet.heights.set(60, 50);

    let follower = fleet.controller(factory, fleet.store.clone(), StaticInstance::follower());
    let handle = follower.on_module_init().await.unwrap();
    assert!(!handle.is_scheduling());
    assert!(fleet.queue.has_handler(follower.job_name()));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(fleet.queue.jobs_named(follower.job_name()).is_empty());

    // A job dispatched by the leader elsewhere is picked up here.
    fleet
        .queue
        .enqueue(follower.job_name(), FetchJob { block_number: 55 })
        .await
        .unwrap();
    let store = fleet.store.clone();
    wait_until("block 55 stored", || store.get(&key("PoolDeployer", 55)).is_some()).await;
    assert_eq!(fleet.store.get(&key("PoolDeployer", 55)).unwrap().events[0].log_index, 3);

    fleet.queue.close();
}

#[tokio::test]
async fn missing_global_record_halts_leader() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let controller = fleet.controller(
        Factory::new("UniswapV3Factory"),
        fleet.store.clone(),
        StaticInstance::leader(),
    );
    let handle = controller.on_module_init().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), fleet.shutdown.wait())
        .await
        .unwrap();
    assert!(matches!(err, SyncError::HeightMissing { .. }));

    wait_until("scheduler exit", || handle.scheduler_finished()).await;
    assert!(fleet.queue.list_jobs(&JobState::IN_FLIGHT).await.unwrap().is_empty());
    assert!(fleet.store.is_empty());

    fleet.queue.close();
}

#[tokio::test]
async fn persistence_failure_is_retried_by_queue_policy() {
    let fleet = Fleet::new(InMemoryJobQueue::new(QueueConfig {
        max_attempts: 2,
        ..QueueConfig::default()
    }));
    let flaky = Arc::new(FlakyStore {
        inner: InMemoryEventSetStore::new(),
        failures: AtomicU32::new(1),
    });
    fleet.heights.set(100, 99);

    let controller = fleet.controller(Factory::new("UniswapV3Factory"), flaky.clone(), StaticInstance::leader());
    let handle = controller.on_module_init().await.unwrap();

    let observed = flaky.clone();
    wait_until("block 100 stored", || observed.inner.get(&key("UniswapV3Factory", 100)).is_some()).await;

    let queue = fleet.queue.clone();
    let name = controller.job_name().to_string();
    wait_until("job completed", || {
        queue.jobs_named(&name).iter().any(|j| j.state == JobState::Completed)
    })
    .await;

    let jobs = fleet.queue.jobs_named(controller.job_name());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 2);
    assert!(!fleet.shutdown.is_triggered());

    handle.stop();
    fleet.queue.close();
}

#[tokio::test]
async fn persistence_failure_without_retry_fails_job_only() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let flaky = Arc::new(FlakyStore {
        inner: InMemoryEventSetStore::new(),
        failures: AtomicU32::new(1),
    });
    let controller = fleet.controller(Factory::new("UniswapV3Factory"), flaky.clone(), StaticInstance::follower());
    controller.on_module_init().await.unwrap();

    let id = fleet
        .queue
        .enqueue(controller.job_name(), FetchJob { block_number: 9 })
        .await
        .unwrap();
    let queue = fleet.queue.clone();
    wait_until("job failed", || queue.job(id).map(|j| j.state) == Some(JobState::Failed)).await;

    let job = fleet.queue.job(id).unwrap();
    assert!(job.failed_reason.unwrap().contains("bulk index rejected"));
    assert!(flaky.inner.is_empty());
    assert!(!fleet.shutdown.is_triggered());

    fleet.queue.close();
}

#[tokio::test]
async fn duplicate_registration_halts_second_controller() {
    let fleet = Fleet::new(InMemoryJobQueue::default());
    let first = fleet.controller(Factory::new("UniswapV3Factory"), fleet.store.clone(), StaticInstance::follower());
    let second = fleet.controller(Factory::new("UniswapV3Factory"), fleet.store.clone(), StaticInstance::follower());

    first.on_module_init().await.unwrap();
    let err = second.on_module_init().await.unwrap_err();

    assert!(matches!(err, SyncError::Registration { .. }));
    assert!(fleet.shutdown.is_triggered());

    fleet.queue.close();
}
