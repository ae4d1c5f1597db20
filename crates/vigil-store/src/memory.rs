//! In-process backend: one reader/writer lock over two maps.
//!
//! `MemoryStore` is also the mirror inside the file and relational backends
//! and the agent's local buffer, which is why its mutators are plain
//! synchronous methods as well as `MetricStore` trait methods.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use vigil_core::Snapshot;

use crate::error::StoreResult;
use crate::MetricStore;

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a snapshot (restore path).
    pub fn from_snapshot(snap: Snapshot) -> Self {
        let store = Self::new();
        store.replace(snap);
        store
    }

    // A panic while holding the lock cannot leave a half-written entry
    // behind (every write is a single map insert), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.write().gauges.insert(name.to_string(), value);
    }

    /// Add `delta` and return the new accumulator. Saturates at the i64 range.
    pub fn add_counter(&self, name: &str, delta: i64) -> i64 {
        let mut maps = self.write();
        let slot = maps.counters.entry(name.to_string()).or_insert(0);
        *slot = slot.saturating_add(delta);
        *slot
    }

    pub fn put_counter(&self, name: &str, value: i64) {
        self.write().counters.insert(name.to_string(), value);
    }

    /// Replace the whole content in one step.
    pub fn replace(&self, snap: Snapshot) {
        let mut maps = self.write();
        maps.gauges = snap.gauges.into_iter().collect();
        maps.counters = snap.counters.into_iter().collect();
    }

    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.read().gauges.get(name).copied()
    }

    pub fn get_counter(&self, name: &str) -> Option<i64> {
        self.read().counters.get(name).copied()
    }

    pub fn to_snapshot(&self) -> Snapshot {
        let maps = self.read();
        Snapshot {
            gauges: maps.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            counters: maps.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn update_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
        self.set_gauge(name, value);
        Ok(())
    }

    async fn update_counter(&self, name: &str, delta: i64) -> StoreResult<()> {
        self.add_counter(name, delta);
        Ok(())
    }

    async fn set_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        self.put_counter(name, value);
        Ok(())
    }

    fn gauge(&self, name: &str) -> Option<f64> {
        self.get_gauge(name)
    }

    fn counter(&self, name: &str) -> Option<i64> {
        self.get_counter(name)
    }

    fn snapshot(&self) -> Snapshot {
        self.to_snapshot()
    }
}
