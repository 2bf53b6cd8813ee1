//! Fatal-shutdown facility.
//!
//! Anything that could let recorded state drift from chain truth ends here:
//! the error is logged once and the process is brought down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::SyncError;

/// Terminates the process on unrecoverable errors.
pub trait Shutdown: Send + Sync {
    /// Halt with `error`. Callers must not continue after this returns.
    fn halt_with_error(&self, error: &SyncError);
}

/// Captures the first fatal error and wakes everything waiting on it.
///
/// The binary awaits [`FatalShutdown::wait`] and exits once it resolves.
#[derive(Clone, Default)]
pub struct FatalShutdown {
    inner: Arc<FatalInner>,
}

#[derive(Default)]
struct FatalInner {
    triggered: AtomicBool,
    captured: Mutex<Option<SyncError>>,
    notify: Notify,
}

impl FatalShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// The first captured error, if any.
    pub fn error(&self) -> Option<SyncError> {
        self.inner.captured.lock().unwrap().clone()
    }

    /// Resolve with the captured error once a halt has been requested.
    pub async fn wait(&self) -> SyncError {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(error) = self.error() {
                return error;
            }
            notified.await;
        }
    }
}

impl Shutdown for FatalShutdown {
    fn halt_with_error(&self, error: &SyncError) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!(error = %error, "fatal error after shutdown was already requested");
            return;
        }

        tracing::error!(error = %error, "fatal error; initiating shutdown");

        {
            let mut slot = self.inner.captured.lock().unwrap();
            if slot.is_none() {
                *slot = Some(error.clone());
            }
        }
        self.inner.notify.notify_waiters();
    }
}

/// Logs the error and exits the process with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitOnFatal;

impl Shutdown for ExitOnFatal {
    fn halt_with_error(&self, error: &SyncError) {
        tracing::error!(error = %error, "fatal error; exiting");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_error_wins() {
        let shutdown = FatalShutdown::new();
        assert!(!shutdown.is_triggered());

        shutdown.halt_with_error(&SyncError::HeightMissing { id: "global".into() });
        shutdown.halt_with_error(&SyncError::StoreQuery("later".into()));

        assert!(shutdown.is_triggered());
        assert!(matches!(shutdown.error(), Some(SyncError::HeightMissing { .. })));
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let shutdown = FatalShutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.halt_with_error(&SyncError::Config("bad".into()));

        let err = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_triggered() {
        let shutdown = FatalShutdown::new();
        shutdown.halt_with_error(&SyncError::Instance("gone".into()));
        let err = shutdown.wait().await;
        assert!(matches!(err, SyncError::Instance(_)));
    }
}
