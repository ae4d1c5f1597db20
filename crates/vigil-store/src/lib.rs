//! vigil store: the `MetricStore` capability and its backends.
//!
//! - [`MemoryStore`]: maps behind one reader/writer lock, no durability.
//! - [`FileStore`]: memory mirror persisted as a JSON file (atomic rewrite).
//! - [`DbStore`]: write-through to PostgreSQL with retried writes.
//!
//! The backend is picked once, from configuration, by [`open`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod db;
pub mod error;
pub mod file;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::{MetricUpdate, Snapshot};

pub use db::{DbConfig, DbStore, MetricTable, PgTable};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

/// Uniform storage contract shared by every backend.
///
/// Mutators are async because durable backends do I/O. Reads are served
/// from an in-memory mirror and never block on the backend.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Backend name, for logs.
    fn kind(&self) -> &'static str;

    /// Overwrite a gauge.
    async fn update_gauge(&self, name: &str, value: f64) -> StoreResult<()>;
    /// Add `delta` to a counter.
    async fn update_counter(&self, name: &str, delta: i64) -> StoreResult<()>;
    /// Replace a counter's accumulator outright.
    async fn set_counter(&self, name: &str, value: i64) -> StoreResult<()>;

    fn gauge(&self, name: &str) -> Option<f64>;
    fn counter(&self, name: &str) -> Option<i64>;
    /// Deep copy of every metric.
    fn snapshot(&self) -> Snapshot;

    /// Push the whole mirror to the durable backend.
    async fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Backend health; only the relational backend has one.
    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported("ping"))
    }

    /// Stop background work and release the backend.
    async fn shutdown(&self) -> StoreResult<()> {
        self.flush().await
    }

    async fn apply(&self, update: &MetricUpdate) -> StoreResult<()> {
        match update {
            MetricUpdate::Gauge { name, value } => self.update_gauge(name, *value).await,
            MetricUpdate::Counter { name, delta } => self.update_counter(name, *delta).await,
        }
    }
}

/// Backend selection, resolved from the collector configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    File {
        path: PathBuf,
        /// Zero means save on every mutation.
        interval: Duration,
        restore: bool,
    },
    Database(DbConfig),
}

/// Build the configured backend.
pub async fn open(cfg: &StoreConfig) -> StoreResult<Arc<dyn MetricStore>> {
    let store: Arc<dyn MetricStore> = match cfg {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::File { path, interval, restore } => FileStore::open(path, *interval, *restore)?,
        StoreConfig::Database(db) => Arc::new(DbStore::connect(db).await?),
    };
    tracing::info!(backend = store.kind(), "metric store ready");
    Ok(store)
}
