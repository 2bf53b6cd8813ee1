//! Fluent builder for [`EventController`].
//!
//! Every collaborator is passed in explicitly; nothing is looked up from a
//! container.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = ControllerBuilder::new()
//!     .event_name("PoolCreated")
//!     .artifact(factory)
//!     .heights(heights)
//!     .queue(queue)
//!     .store(store)
//!     .instance(Arc::new(StaticInstance::leader()))
//!     .shutdown(Arc::new(ExitOnFatal))
//!     .build()?;
//! ```

use std::sync::Arc;

use crate::artifact::ArtifactContract;
use crate::config::ControllerConfig;
use crate::controller::EventController;
use crate::converter::{EventConverter, UnconfiguredConverter};
use crate::error::SyncError;
use crate::fatal::Shutdown;
use crate::height::HeightSource;
use crate::instance::InstanceIdentity;
use crate::queue::JobQueue;
use crate::store::EventSetStore;

/// Fluent builder for `EventController`.
#[derive(Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
    event_name: Option<String>,
    artifact: Option<Arc<dyn ArtifactContract>>,
    converter: Option<Arc<dyn EventConverter>>,
    heights: Option<Arc<dyn HeightSource>>,
    queue: Option<Arc<dyn JobQueue>>,
    store: Option<Arc<dyn EventSetStore>>,
    instance: Option<Arc<dyn InstanceIdentity>>,
    shutdown: Option<Arc<dyn Shutdown>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole config.
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the job-name namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the scheduler tick period in milliseconds.
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    /// The event this controller tracks.
    pub fn event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    pub fn artifact(mut self, artifact: Arc<dyn ArtifactContract>) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Optional; defaults to [`UnconfiguredConverter`].
    pub fn converter(mut self, converter: Arc<dyn EventConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn heights(mut self, heights: Arc<dyn HeightSource>) -> Self {
        self.heights = Some(heights);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(mut self, store: Arc<dyn EventSetStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn instance(mut self, instance: Arc<dyn InstanceIdentity>) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn shutdown(mut self, shutdown: Arc<dyn Shutdown>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the controller, failing on invalid config or a missing collaborator.
    pub fn build(self) -> Result<EventController, SyncError> {
        self.config.validate()?;

        let event_name = self
            .event_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SyncError::Config("event name must be set".into()))?;
        let artifact = required(self.artifact, "artifact")?;
        if artifact.artifact_name().is_empty() {
            return Err(SyncError::Config("artifact name must not be empty".into()));
        }

        Ok(EventController::new(
            self.config,
            event_name,
            artifact,
            self.converter.unwrap_or_else(|| Arc::new(UnconfiguredConverter)),
            required(self.heights, "heights")?,
            required(self.queue, "queue")?,
            required(self.store, "store")?,
            required(self.instance, "instance")?,
            required(self.shutdown, "shutdown")?,
        ))
    }
}

fn required<T: ?Sized>(value: Option<Arc<T>>, what: &str) -> Result<Arc<T>, SyncError> {
    value.ok_or_else(|| SyncError::Config(format!("missing collaborator: {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal::FatalShutdown;
    use crate::height::GlobalHeightRecord;
    use crate::instance::StaticInstance;
    use crate::queue::{FetchJob, JobHandler, JobState, QueuedJob};
    use crate::types::{EventSetKey, EvmEventSet, RawLogEntry};
    use async_trait::async_trait;

    struct Nothing;

    #[async_trait]
    impl ArtifactContract for Nothing {
        fn artifact_name(&self) -> &str {
            "Factory"
        }
        async fn fetch_events(&self, _: &str, _: u64, _: u64) -> Result<Vec<RawLogEntry>, SyncError> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl HeightSource for Nothing {
        async fn search(&self, _: &str) -> Result<Option<GlobalHeightRecord>, SyncError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl JobQueue for Nothing {
        async fn enqueue(&self, _: &str, _: FetchJob) -> Result<u64, SyncError> {
            Ok(0)
        }
        async fn list_jobs(&self, _: &[JobState]) -> Result<Vec<QueuedJob>, SyncError> {
            Ok(vec![])
        }
        async fn register_handler(
            &self,
            _: &str,
            _: usize,
            _: Arc<dyn JobHandler>,
        ) -> Result<(), SyncError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventSetStore for Nothing {
        async fn query(&self, _: &EventSetKey) -> Result<Vec<EvmEventSet>, SyncError> {
            Ok(vec![])
        }
        async fn create(&self, set: EvmEventSet) -> Result<EvmEventSet, SyncError> {
            Ok(set)
        }
    }

    fn complete() -> ControllerBuilder {
        let nothing = Arc::new(Nothing);
        ControllerBuilder::new()
            .event_name("Created")
            .artifact(nothing.clone())
            .heights(nothing.clone())
            .queue(nothing.clone())
            .store(nothing)
            .instance(Arc::new(StaticInstance::follower()))
            .shutdown(Arc::new(FatalShutdown::new()))
    }

    #[test]
    fn builds_with_all_collaborators() {
        let controller = complete().namespace("indexer").build().unwrap();
        assert_eq!(controller.artifact_name(), "Factory");
        assert_eq!(controller.job_name(), "indexer:fetch-evm-events-for-block:Factory:Created");
        assert_eq!(controller.config().tick_interval_ms, 1_000);
    }

    #[test]
    fn missing_collaborator_is_config_error() {
        let err = ControllerBuilder::new()
            .event_name("Created")
            .artifact(Arc::new(Nothing))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Config(ref msg) if msg.contains("heights")));
    }

    #[test]
    fn empty_event_name_rejected() {
        let err = complete().event_name("").build().err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn invalid_config_rejected() {
        let err = complete().tick_interval_ms(0).build().err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
