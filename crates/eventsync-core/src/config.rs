//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Configuration shared by every controller in a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Prefix of every job name.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Scheduler tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_namespace() -> String {
    "eventsync".into()
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl ControllerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.namespace.is_empty() {
            return Err(SyncError::Config("namespace must not be empty".into()));
        }
        if self.namespace.contains(':') {
            return Err(SyncError::Config(format!(
                "namespace '{}' must not contain ':'",
                self.namespace
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SyncError::Config("tick_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let cfg: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_interval_and_bad_namespace() {
        let cfg = ControllerConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ControllerConfig {
            namespace: "a:b".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
