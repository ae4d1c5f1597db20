use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;
use vigil_core::Snapshot;

use super::{DbConfig, MetricTable};
use crate::error::StoreResult;

const CREATE_GAUGE: &str = "CREATE TABLE IF NOT EXISTS gauge (
    name TEXT PRIMARY KEY,
    value DOUBLE PRECISION NOT NULL
)";

const CREATE_COUNTER: &str = "CREATE TABLE IF NOT EXISTS counter (
    name TEXT PRIMARY KEY,
    value BIGINT NOT NULL
)";

const UPSERT_GAUGE: &str = "INSERT INTO gauge (name, value) VALUES ($1, $2)
    ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value";

const ADD_COUNTER: &str = "INSERT INTO counter (name, value) VALUES ($1, $2)
    ON CONFLICT (name) DO UPDATE SET value = counter.value + EXCLUDED.value
    RETURNING value";

const UPSERT_COUNTER: &str = "INSERT INTO counter (name, value) VALUES ($1, $2)
    ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value";

/// PostgreSQL tables behind a connection pool.
#[derive(Debug, Clone)]
pub struct PgTable {
    pool: PgPool,
}

impl PgTable {
    pub async fn connect(cfg: &DbConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.connect_timeout)
            .connect(&cfg.dsn)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetricTable for PgTable {
    async fn init(&self) -> StoreResult<()> {
        sqlx::query(CREATE_GAUGE).execute(&self.pool).await?;
        sqlx::query(CREATE_COUNTER).execute(&self.pool).await?;
        Ok(())
    }

    async fn load(&self) -> StoreResult<Snapshot> {
        let gauges: Vec<(String, f64)> = sqlx::query_as("SELECT name, value FROM gauge")
            .fetch_all(&self.pool)
            .await?;
        let counters: Vec<(String, i64)> = sqlx::query_as("SELECT name, value FROM counter")
            .fetch_all(&self.pool)
            .await?;
        Ok(Snapshot {
            gauges: gauges.into_iter().collect(),
            counters: counters.into_iter().collect(),
        })
    }

    async fn upsert_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
        sqlx::query(UPSERT_GAUGE).bind(name).bind(value).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_counter(&self, name: &str, delta: i64) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(ADD_COUNTER)
            .bind(name)
            .bind(delta)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn upsert_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        sqlx::query(UPSERT_COUNTER).bind(name).bind(value).execute(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
