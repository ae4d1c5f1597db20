//! Relational backend: write-through to two tables, reads from a mirror.
//!
//! Every write goes to the database first, through `Backoff`, and only a
//! successful write is mirrored. Writes are serialized by an async lock that
//! is held across the backed-off round trip, so the mirror and the table
//! agree on the order of updates to one name.
//!
//! The SQL itself lives behind [`MetricTable`]; [`PgTable`] is the
//! PostgreSQL implementation.

mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vigil_core::{Backoff, Snapshot};

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryStore;
use crate::MetricStore;

pub use postgres::PgTable;

/// Connection settings for the relational backend.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub dsn: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub ping_timeout: Duration,
    pub backoff: Backoff,
}

impl DbConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            backoff: Backoff::storage(),
        }
    }
}

/// Table-level operations of the relational backend.
///
/// Each method is a single statement; retries are the caller's business.
#[async_trait]
pub trait MetricTable: Send + Sync {
    /// Create the tables if they do not exist.
    async fn init(&self) -> StoreResult<()>;
    /// Full scan of both tables.
    async fn load(&self) -> StoreResult<Snapshot>;
    async fn upsert_gauge(&self, name: &str, value: f64) -> StoreResult<()>;
    /// Server-side `value = value + delta`; returns the stored total.
    async fn add_counter(&self, name: &str, delta: i64) -> StoreResult<i64>;
    async fn upsert_counter(&self, name: &str, value: i64) -> StoreResult<()>;
    async fn ping(&self) -> StoreResult<()>;
    async fn close(&self) {}
}

pub struct DbStore<T = PgTable> {
    table: T,
    mirror: MemoryStore,
    writes: Mutex<()>,
    backoff: Backoff,
    ping_timeout: Duration,
}

impl DbStore<PgTable> {
    /// Connect, bootstrap the schema and load the mirror.
    pub async fn connect(cfg: &DbConfig) -> StoreResult<Self> {
        let table = PgTable::connect(cfg).await?;
        let store = Self::with_table(table, cfg.backoff.clone()).await?;
        Ok(store.with_ping_timeout(cfg.ping_timeout))
    }
}

impl<T: MetricTable> DbStore<T> {
    pub async fn with_table(table: T, backoff: Backoff) -> StoreResult<Self> {
        backoff.run(|| table.init()).await?;
        let snap = backoff.run(|| table.load()).await?;
        tracing::info!(
            gauges = snap.gauges.len(),
            counters = snap.counters.len(),
            "loaded metric mirror from database"
        );
        Ok(Self {
            table,
            mirror: MemoryStore::from_snapshot(snap),
            writes: Mutex::new(()),
            backoff,
            ping_timeout: Duration::from_secs(2),
        })
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Upsert every mirrored metric, counters as absolute values.
    ///
    /// Best effort: a failed item does not stop the rest, and the first
    /// failure is returned once every item has been tried.
    pub async fn save_all(&self) -> StoreResult<()> {
        let _w = self.writes.lock().await;
        let snap = self.mirror.to_snapshot();
        let mut first_err = None;
        let mut failed = 0usize;

        for (name, value) in &snap.gauges {
            if let Err(e) = self.backoff.run(|| self.table.upsert_gauge(name, *value)).await {
                tracing::warn!(%name, error = %e, "save_all: gauge upsert failed");
                failed += 1;
                first_err.get_or_insert(e);
            }
        }
        for (name, value) in &snap.counters {
            if let Err(e) = self.backoff.run(|| self.table.upsert_counter(name, *value)).await {
                tracing::warn!(%name, error = %e, "save_all: counter upsert failed");
                failed += 1;
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            None => Ok(()),
            Some(e) => {
                tracing::error!(failed, total = snap.len(), "save_all finished with failures");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl<T: MetricTable> MetricStore for DbStore<T> {
    fn kind(&self) -> &'static str {
        "database"
    }

    async fn update_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
        let _w = self.writes.lock().await;
        self.backoff.run(|| self.table.upsert_gauge(name, value)).await?;
        self.mirror.set_gauge(name, value);
        Ok(())
    }

    async fn update_counter(&self, name: &str, delta: i64) -> StoreResult<()> {
        let _w = self.writes.lock().await;
        // The table may be shared with other collectors; mirror its total.
        let total = self.backoff.run(|| self.table.add_counter(name, delta)).await?;
        self.mirror.put_counter(name, total);
        Ok(())
    }

    async fn set_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        let _w = self.writes.lock().await;
        self.backoff.run(|| self.table.upsert_counter(name, value)).await?;
        self.mirror.put_counter(name, value);
        Ok(())
    }

    fn gauge(&self, name: &str) -> Option<f64> {
        self.mirror.get_gauge(name)
    }

    fn counter(&self, name: &str) -> Option<i64> {
        self.mirror.get_counter(name)
    }

    fn snapshot(&self) -> Snapshot {
        self.mirror.to_snapshot()
    }

    async fn flush(&self) -> StoreResult<()> {
        self.save_all().await
    }

    async fn ping(&self) -> StoreResult<()> {
        tokio::time::timeout(self.ping_timeout, self.table.ping())
            .await
            .map_err(|_| StoreError::Timeout("ping"))?
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.table.close().await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use vigil_core::retry::{Classify, ErrorClass};

    /// In-memory table whose next `fail` writes error out.
    #[derive(Default)]
    struct FlakyTable {
        rows: StdMutex<Snapshot>,
        fail: AtomicUsize,
        fatal: bool,
        writes: AtomicUsize,
        hang_ping: bool,
    }

    impl FlakyTable {
        fn failing(n: usize) -> Self {
            Self { fail: AtomicUsize::new(n), ..Default::default() }
        }

        fn attempt(&self) -> StoreResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            self.fail.fetch_sub(1, Ordering::SeqCst);
            if self.fatal {
                Err(StoreError::Sql(sqlx::Error::Protocol("bad statement".into())))
            } else {
                Err(StoreError::Sql(sqlx::Error::Io(io::Error::from(io::ErrorKind::ConnectionReset))))
            }
        }
    }

    #[async_trait]
    impl MetricTable for FlakyTable {
        async fn init(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn load(&self) -> StoreResult<Snapshot> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn upsert_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
            self.attempt()?;
            self.rows.lock().unwrap().gauges.insert(name.into(), value);
            Ok(())
        }

        async fn add_counter(&self, name: &str, delta: i64) -> StoreResult<i64> {
            self.attempt()?;
            let mut rows = self.rows.lock().unwrap();
            let total = rows.counters.entry(name.into()).or_insert(0);
            *total += delta;
            Ok(*total)
        }

        async fn upsert_counter(&self, name: &str, value: i64) -> StoreResult<()> {
            self.attempt()?;
            self.rows.lock().unwrap().counters.insert(name.into(), value);
            Ok(())
        }

        async fn ping(&self) -> StoreResult<()> {
            if self.hang_ping {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_mirrored() {
        let store = DbStore::with_table(FlakyTable::failing(2), Backoff::storage()).await.unwrap();
        store.update_counter("PollCount", 5).await.unwrap();
        store.update_counter("PollCount", 2).await.unwrap();

        assert_eq!(store.table.writes.load(Ordering::SeqCst), 4);
        assert_eq!(store.counter("PollCount"), Some(7));
        assert_eq!(store.table.rows.lock().unwrap().counters["PollCount"], 7);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_write_leaves_mirror_untouched() {
        let store = DbStore::with_table(FlakyTable::failing(100), Backoff::storage()).await.unwrap();
        let err = store.update_gauge("Alloc", 1.0).await.unwrap_err();

        assert_eq!(store.table.writes.load(Ordering::SeqCst), 4);
        assert_eq!(err.class(), ErrorClass::Retriable);
        assert!(err.to_string().contains("failed after 4 attempts"));
        assert_eq!(store.gauge("Alloc"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_write_is_not_retried() {
        let table = FlakyTable { fatal: true, ..FlakyTable::failing(100) };
        let store = DbStore::with_table(table, Backoff::storage()).await.unwrap();
        assert!(store.set_counter("c", 1).await.is_err());
        assert_eq!(store.table.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.counter("c"), None);
    }

    #[tokio::test]
    async fn mirror_is_loaded_at_startup() {
        let table = FlakyTable::default();
        table.rows.lock().unwrap().gauges.insert("Alloc".into(), 3.0);
        table.rows.lock().unwrap().counters.insert("PollCount".into(), 9);

        let store = DbStore::with_table(table, Backoff::once()).await.unwrap();
        assert_eq!(store.gauge("Alloc"), Some(3.0));
        assert_eq!(store.counter("PollCount"), Some(9));
    }

    #[tokio::test]
    async fn save_all_tries_every_item_and_reports_first_error() {
        let store = DbStore::with_table(FlakyTable::default(), Backoff::once()).await.unwrap();
        store.update_gauge("a", 1.0).await.unwrap();
        store.update_gauge("b", 2.0).await.unwrap();
        store.update_counter("c", 3).await.unwrap();
        assert_eq!(store.table.writes.load(Ordering::SeqCst), 3);

        store.table.fail.store(2, Ordering::SeqCst);
        assert!(store.save_all().await.is_err());
        // the third item still went through
        assert_eq!(store.table.writes.load(Ordering::SeqCst), 6);
        assert_eq!(store.table.rows.lock().unwrap().counters["c"], 3);

        assert!(store.flush().await.is_ok());
    }

    #[tokio::test]
    async fn ping_delegates_to_table() {
        let store = DbStore::with_table(FlakyTable::default(), Backoff::once()).await.unwrap();
        assert!(store.ping().await.is_ok());
        assert_eq!(store.kind(), "database");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_ping_times_out_as_unavailable() {
        let table = FlakyTable { hang_ping: true, ..FlakyTable::default() };
        let store = DbStore::with_table(table, Backoff::once())
            .await
            .unwrap()
            .with_ping_timeout(Duration::from_millis(500));

        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout("ping")));
        assert!(err.is_unavailable());
        assert_eq!(vigil_core::VigilError::from(err).client_code(), vigil_core::ClientCode::Unavailable);
    }

    #[tokio::test]
    async fn counter_mirror_follows_the_table_total() {
        let store = DbStore::with_table(FlakyTable::default(), Backoff::once()).await.unwrap();
        store.update_counter("PollCount", 2).await.unwrap();

        // another collector adds to the same row
        *store.table.rows.lock().unwrap().counters.get_mut("PollCount").unwrap() += 10;

        store.update_counter("PollCount", 1).await.unwrap();
        assert_eq!(store.counter("PollCount"), Some(13));
    }
}
