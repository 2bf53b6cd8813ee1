//! `run` — long-running ingestion process.
//!
//! Builds the job queue from `queue`, one controller per `controllers`
//! entry, and initializes each one. The process then lives until the
//! first fatal error or Ctrl-C.

use std::collections::HashSet;
use std::sync::Arc;

use eventsync_core::{
    ArtifactContract, ControllerBuilder, ControllerHandle, EventController, EventSetStore,
    FatalShutdown, HeightSource, StaticInstance, SyncError,
};
use eventsync_storage::InMemoryJobQueue;
use tracing::info;

use crate::config::{ControllerEntry, SyncConfig};

/// Storage shared by every controller.
pub struct Backends {
    pub heights: Arc<dyn HeightSource>,
    pub store: Arc<dyn EventSetStore>,
}

/// Controllers started by [`start`].
pub struct Runtime {
    pub controllers: Vec<Arc<EventController>>,
    pub handles: Vec<ControllerHandle>,
    pub queue: Arc<InMemoryJobQueue>,
    pub shutdown: FatalShutdown,
}

impl Runtime {
    /// Resolves with the first fatal error any controller reports.
    pub async fn wait_fatal(&self) -> SyncError {
        self.shutdown.wait().await
    }

    /// Stop scheduler ticks and the queue's worker lanes.
    pub fn stop(self) {
        for handle in self.handles {
            handle.stop();
        }
        self.queue.close();
    }
}

/// Build and initialize one controller per configured entry.
///
/// `artifact_for` supplies the contract source for an entry. On any failure
/// the controllers already started are stopped before the error returns.
pub async fn start<F>(config: &SyncConfig, backends: Backends, mut artifact_for: F) -> Result<Runtime, SyncError>
where
    F: FnMut(&ControllerEntry) -> Result<Arc<dyn ArtifactContract>, SyncError>,
{
    let mut runtime = Runtime {
        controllers: Vec::with_capacity(config.controllers.len()),
        handles: Vec::with_capacity(config.controllers.len()),
        queue: Arc::new(InMemoryJobQueue::new(config.queue)),
        shutdown: FatalShutdown::new(),
    };
    let instance = Arc::new(StaticInstance(config.instance.clone()));

    let mut seen = HashSet::new();
    for entry in &config.controllers {
        let started = async {
            let artifact = artifact_for(entry)?;
            if artifact.artifact_name() != entry.artifact {
                return Err(SyncError::Config(format!(
                    "artifact for {} reports name '{}'",
                    entry.identity(),
                    artifact.artifact_name()
                )));
            }
            if !seen.insert(entry.identity()) {
                return Err(SyncError::Config(format!("duplicate controller {}", entry.identity())));
            }

            let controller = Arc::new(
                ControllerBuilder::new()
                    .config(config.controller.clone())
                    .event_name(&entry.event)
                    .artifact(artifact)
                    .heights(backends.heights.clone())
                    .queue(runtime.queue.clone())
                    .store(backends.store.clone())
                    .instance(instance.clone())
                    .shutdown(Arc::new(runtime.shutdown.clone()))
                    .build()?,
            );
            let handle = controller.on_module_init().await?;
            Ok::<_, SyncError>((controller, handle))
        }
        .await;

        match started {
            Ok((controller, handle)) => {
                runtime.controllers.push(controller);
                runtime.handles.push(handle);
            }
            Err(err) => {
                runtime.stop();
                return Err(err);
            }
        }
    }

    info!(
        controllers = runtime.controllers.len(),
        kind = %config.instance.kind,
        is_leader = config.instance.is_leader,
        max_attempts = config.queue.max_attempts,
        "eventsync running"
    );
    Ok(runtime)
}
