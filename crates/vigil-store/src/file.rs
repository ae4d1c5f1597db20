//! JSON file backend on top of the memory mirror.
//!
//! The backing file holds a JSON array of `{id, type, value?, delta?}`
//! records. Every save writes the complete snapshot to `<file>.tmp`, fsyncs
//! it and renames it over the target, so a crash leaves either the old or
//! the new file and never a truncated one.
//!
//! Persistence modes:
//! - `interval == 0`: save after every mutation, inside the call.
//! - `interval > 0`: a background task saves on a timer; `shutdown` stops
//!   it and saves one last time. `flush` saves without stopping it.
//!
//! Saves run on the blocking pool. The snapshot is taken under the file
//! lock, so whichever save writes last also carries the newest state.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use vigil_core::{MetricRecord, Snapshot};

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::MetricStore;

#[derive(Debug)]
pub struct FileStore {
    mem: Arc<MemoryStore>,
    path: PathBuf,
    interval: Duration,
    /// Serializes writers of the backing file.
    save_lock: Arc<Mutex<()>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl FileStore {
    /// Open the store, loading `path` first when `restore` is set.
    ///
    /// A missing file is an empty store. A file that exists but does not
    /// parse is an error. With a non-zero `interval` this spawns the save
    /// task and therefore must be called inside a tokio runtime.
    pub fn open(path: impl Into<PathBuf>, interval: Duration, restore: bool) -> StoreResult<Arc<Self>> {
        let path = path.into();
        let mem = if restore {
            let snap = load(&path)?;
            tracing::info!(path = %path.display(), metrics = snap.len(), "restored metrics from file");
            MemoryStore::from_snapshot(snap)
        } else {
            MemoryStore::new()
        };
        let mem = Arc::new(mem);

        let store = Arc::new(Self {
            mem,
            path,
            interval,
            save_lock: Arc::new(Mutex::new(())),
            ticker: Mutex::new(None),
        });

        if !interval.is_zero() {
            let handle = tokio::spawn(save_loop(Arc::downgrade(&store), interval));
            *store.ticker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_synchronous(&self) -> bool {
        self.interval.is_zero()
    }

    /// Write the full current snapshot to disk.
    pub async fn save(&self) -> StoreResult<()> {
        let mem = Arc::clone(&self.mem);
        let lock = Arc::clone(&self.save_lock);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || save_blocking(&mem, &lock, &path))
            .await
            .map_err(io::Error::other)?
    }

    async fn after_mutation(&self) -> StoreResult<()> {
        if self.is_synchronous() {
            self.save().await?;
        }
        Ok(())
    }

    fn stop_ticker(&self) {
        let handle = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(h) = handle {
            h.abort();
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

async fn save_loop(store: Weak<FileStore>, every: Duration) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    tick.tick().await;
    loop {
        tick.tick().await;
        let Some(store) = store.upgrade() else { break };
        if let Err(e) = store.save().await {
            tracing::warn!(path = %store.path.display(), error = %e, "periodic save failed");
        }
    }
}

fn save_blocking(mem: &MemoryStore, lock: &Mutex<()>, path: &Path) -> StoreResult<()> {
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    let records = mem.to_snapshot().to_records();
    let data = serde_json::to_vec_pretty(&records)?;
    write_atomic(path, &data)?;
    Ok(())
}

/// Read a backing file. Absent or blank means empty.
pub fn load(path: &Path) -> StoreResult<Snapshot> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::default()),
        Err(e) => return Err(e.into()),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::default());
    }
    let records: Vec<MetricRecord> = serde_json::from_slice(&data)?;
    Ok(Snapshot::from_records(records))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    let tmp = tmp_path(path);
    {
        let mut f = File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    // Persist the rename itself; not every platform can open a directory.
    if let Some(dir) = dir {
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

#[async_trait]
impl MetricStore for FileStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn update_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
        self.mem.set_gauge(name, value);
        self.after_mutation().await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> StoreResult<()> {
        self.mem.add_counter(name, delta);
        self.after_mutation().await
    }

    async fn set_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        self.mem.put_counter(name, value);
        self.after_mutation().await
    }

    fn gauge(&self, name: &str) -> Option<f64> {
        self.mem.get_gauge(name)
    }

    fn counter(&self, name: &str) -> Option<i64> {
        self.mem.get_counter(name)
    }

    fn snapshot(&self) -> Snapshot {
        self.mem.to_snapshot()
    }

    async fn flush(&self) -> StoreResult<()> {
        self.save().await
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.stop_ticker();
        self.save().await?;
        tracing::info!(path = %self.path.display(), "final save complete");
        Ok(())
    }
}
