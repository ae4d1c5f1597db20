//! Shared application state for the collector.

use std::sync::Arc;

use vigil_core::error::{Result, VigilError};
use vigil_core::IntegrityGuard;
use vigil_store::MetricStore;

use crate::config::CollectorConfig;
use crate::obs::metrics::CollectorMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: CollectorConfig,
    store: Arc<dyn MetricStore>,
    guard: Option<IntegrityGuard>,
    metrics: CollectorMetrics,
}

impl AppState {
    /// Wrap an already opened store.
    pub fn new(cfg: CollectorConfig, store: Arc<dyn MetricStore>) -> Self {
        let guard = IntegrityGuard::from_key(&cfg.key);
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                store,
                guard,
                metrics: CollectorMetrics::default(),
            }),
        }
    }

    /// Open the configured backend and build the state.
    /// Returns Result so main can report startup failures without panicking.
    pub async fn open(cfg: CollectorConfig) -> Result<Self> {
        let store = vigil_store::open(&cfg.store_config())
            .await
            .map_err(|e| VigilError::Internal(format!("storage init failed: {e}")))?;
        Ok(Self::new(cfg, store))
    }

    pub fn cfg(&self) -> &CollectorConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.inner.store
    }

    /// `None` when no key is configured.
    pub fn guard(&self) -> Option<&IntegrityGuard> {
        self.inner.guard.as_ref()
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.inner.metrics
    }

    /// Gauge lines appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let snap = self.store().snapshot();
        vec![
            ("vigil_stored_gauges", snap.gauges.len() as u64),
            ("vigil_stored_counters", snap.counters.len() as u64),
        ]
    }
}
