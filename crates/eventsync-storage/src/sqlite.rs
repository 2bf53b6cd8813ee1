//! SQLite storage backend for eventsync.
//!
//! Persists event sets and the global height record to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use eventsync_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./events.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use eventsync_core::error::SyncError;
use eventsync_core::height::{GlobalHeightRecord, HeightSource};
use eventsync_core::store::EventSetStore;
use eventsync_core::types::{EventSetKey, EvmEvent, EvmEventSet};

/// SQLite-backed storage for event sets and global heights.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./events.db"`) or a full
    /// SQLite URL (`"sqlite:./events.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection: every connection to `sqlite::memory:` is a
    /// separate database.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evm_event_sets (
                artifact_name TEXT    NOT NULL,
                event_name    TEXT    NOT NULL,
                block_number  INTEGER NOT NULL,
                events_json   TEXT    NOT NULL,
                created_at    INTEGER NOT NULL,
                PRIMARY KEY (artifact_name, event_name, block_number)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS global_heights (
                id               TEXT    PRIMARY KEY,
                chain_height     INTEGER NOT NULL,
                processed_height INTEGER NOT NULL,
                updated_at       INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;

        Ok(())
    }

    // ─── Global heights ─────────────────────────────────────────────────────

    /// Upsert a height record. Written by the chain watcher, never by the
    /// controller.
    pub async fn upsert_heights(&self, id: &str, record: GlobalHeightRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT OR REPLACE INTO global_heights
             (id, chain_height, processed_height, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(record.chain_height as i64)
        .bind(record.processed_height as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Other(e.to_string()))?;

        debug!(id, chain_height = record.chain_height, processed_height = record.processed_height, "heights saved");
        Ok(())
    }

    // ─── Event sets ─────────────────────────────────────────────────────────

    /// Total number of stored event sets.
    pub async fn event_set_count(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM evm_event_sets")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::StoreQuery(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── HeightSource impl ───────────────────────────────────────────────────────

#[async_trait]
impl HeightSource for SqliteStorage {
    async fn search(&self, id: &str) -> Result<Option<GlobalHeightRecord>, SyncError> {
        let row = sqlx::query(
            "SELECT chain_height, processed_height FROM global_heights WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::HeightUnavailable(e.to_string()))?;

        Ok(row.map(|r| GlobalHeightRecord {
            chain_height: r.get::<i64, _>("chain_height") as u64,
            processed_height: r.get::<i64, _>("processed_height") as u64,
        }))
    }
}

// ─── EventSetStore impl ──────────────────────────────────────────────────────

#[async_trait]
impl EventSetStore for SqliteStorage {
    async fn query(&self, key: &EventSetKey) -> Result<Vec<EvmEventSet>, SyncError> {
        let rows = sqlx::query(
            "SELECT artifact_name, event_name, block_number, events_json
             FROM evm_event_sets
             WHERE artifact_name = ? AND event_name = ? AND block_number = ?",
        )
        .bind(&key.artifact_name)
        .bind(&key.event_name)
        .bind(key.block_number as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::StoreQuery(e.to_string()))?;

        let mut sets = Vec::with_capacity(rows.len());
        for row in rows {
            let events_str: String = row.get("events_json");
            let events: Vec<EvmEvent> = serde_json::from_str(&events_str)
                .map_err(|e| SyncError::StoreQuery(e.to_string()))?;
            sets.push(EvmEventSet {
                artifact_name: row.get("artifact_name"),
                event_name: row.get("event_name"),
                block_number: row.get::<i64, _>("block_number") as u64,
                events,
            });
        }
        Ok(sets)
    }

    async fn create(&self, set: EvmEventSet) -> Result<EvmEventSet, SyncError> {
        let events = serde_json::to_string(&set.events).map_err(|e| SyncError::Other(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO evm_event_sets
             (artifact_name, event_name, block_number, events_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&set.artifact_name)
        .bind(&set.event_name)
        .bind(set.block_number as i64)
        .bind(&events)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Other(e.to_string()))?;

        debug!(
            artifact = %set.artifact_name,
            event = %set.event_name,
            block = set.block_number,
            events = set.events.len(),
            "event set stored"
        );
        Ok(set)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
