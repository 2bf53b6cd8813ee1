//! Process-level configuration file.
//!
//! ```json
//! {
//!   "log":        { "level": "info", "json": false },
//!   "controller": { "namespace": "eventsync", "tick_interval_ms": 1000 },
//!   "queue":      { "max_attempts": 1, "keep_completed": 1000, "keep_failed": 1000 },
//!   "instance":   { "kind": "worker", "isLeader": true },
//!   "database":   "./eventsync.db",
//!   "rpc":        { "url": "http://127.0.0.1:8545", "timeout_ms": 30000, "max_range": 2000 },
//!   "controllers": [
//!     {
//!       "artifact": "UniswapV3Factory",
//!       "event":    "PoolCreated",
//!       "address":  "0x1f98431c8ad98523631ae4a59f267346ea31f984",
//!       "topic0":   "0x783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118"
//!     }
//!   ]
//! }
//! ```
//!
//! `validate` and `plan` only need `artifact` and `event`; `run` also
//! requires `database`, `rpc` and each entry's `address` and `topic0`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use eventsync_core::{
    job_name, ControllerConfig, ControllerIdentity, InstanceSignature, ProcessKind, FETCH_OPERATION,
};
use eventsync_storage::QueueConfig;

use crate::logging::LogConfig;

/// One `(artifact, event)` pair to run a controller for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEntry {
    pub artifact: String,
    pub event: String,
    /// Contract address to filter logs by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Event signature hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic0: Option<String>,
}

impl ControllerEntry {
    pub fn identity(&self) -> ControllerIdentity {
        ControllerIdentity::new(&self.artifact, &self.event)
    }
}

/// JSON-RPC endpoint used by `run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Block span per `eth_getLogs` call.
    #[serde(default = "default_max_range")]
    pub max_range: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_range() -> u64 {
    2_000
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_instance() -> InstanceSignature {
    InstanceSignature::new(ProcessKind::Worker, true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Role of this process. Defaults to the leading worker.
    #[serde(default = "default_instance")]
    pub instance: InstanceSignature,
    /// SQLite database path for event sets and the global height record.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub rpc: Option<RpcConfig>,
    #[serde(default)]
    pub controllers: Vec<ControllerEntry>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            controller: ControllerConfig::default(),
            queue: QueueConfig::default(),
            instance: default_instance(),
            database: None,
            rpc: None,
            controllers: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config '{}'", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.controller.validate()?;
        if self.queue.max_attempts == 0 {
            bail!("queue.max_attempts must be >= 1");
        }

        let mut seen = HashSet::new();
        for entry in &self.controllers {
            if entry.artifact.is_empty() || entry.event.is_empty() {
                bail!("controller entries need a non-empty artifact and event");
            }
            if !seen.insert(entry.identity()) {
                bail!("duplicate controller {}", entry.identity());
            }
        }
        if let Some(rpc) = &self.rpc {
            if rpc.url.is_empty() {
                bail!("rpc.url must not be empty");
            }
            if rpc.timeout_ms == 0 || rpc.max_range == 0 {
                bail!("rpc.timeout_ms and rpc.max_range must be >= 1");
            }
        }
        Ok(())
    }

    /// Checks the settings only `run` needs. Returns the database path and
    /// RPC endpoint.
    pub fn runtime(&self) -> Result<(&str, &RpcConfig)> {
        let Some(database) = self.database.as_deref().filter(|db| !db.is_empty()) else {
            bail!("`database` is required to run");
        };
        let Some(rpc) = &self.rpc else {
            bail!("`rpc` is required to run");
        };
        if self.controllers.is_empty() {
            bail!("no controllers configured");
        }
        for entry in &self.controllers {
            let has = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
            if !has(&entry.address) || !has(&entry.topic0) {
                bail!("controller {} needs an address and topic0 to run", entry.identity());
            }
        }
        Ok((database, rpc))
    }

    /// Job names the configured controllers will register, in file order.
    pub fn job_names(&self) -> Vec<String> {
        self.controllers
            .iter()
            .map(|entry| job_name(&self.controller.namespace, FETCH_OPERATION, &entry.identity()))
            .collect()
    }
}
