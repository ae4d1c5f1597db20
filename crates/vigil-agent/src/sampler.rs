//! Local metric sampling.
//!
//! A poll produces a set of gauge readings; the poll loop writes them into
//! the agent's buffer and bumps the `PollCount` counter.

use rand::Rng;
use sysinfo::{Pid, System};
use vigil_store::MemoryStore;

/// Counter incremented once per poll.
pub const POLL_COUNT: &str = "PollCount";

pub trait Sampler: Send {
    /// Current gauge readings.
    fn sample(&mut self) -> Vec<(String, f64)>;
}

/// Host memory, per-CPU utilization and own-process memory via `sysinfo`,
/// plus `RandomValue`.
pub struct SystemSampler {
    sys: System,
    pid: Option<Pid>,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!(error = %e, "process metrics unavailable"))
            .ok();
        Self { sys: System::new(), pid }
    }
}

impl Sampler for SystemSampler {
    fn sample(&mut self) -> Vec<(String, f64)> {
        self.sys.refresh_memory();
        self.sys.refresh_cpu();

        let mut out = vec![
            ("TotalMemory".to_string(), self.sys.total_memory() as f64),
            ("FreeMemory".to_string(), self.sys.free_memory() as f64),
            ("UsedMemory".to_string(), self.sys.used_memory() as f64),
        ];
        for (i, cpu) in self.sys.cpus().iter().enumerate() {
            out.push((format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage())));
        }

        if let Some(pid) = self.pid {
            if self.sys.refresh_process(pid) {
                if let Some(p) = self.sys.process(pid) {
                    out.push(("ProcessResident".to_string(), p.memory() as f64));
                    out.push(("ProcessVirtual".to_string(), p.virtual_memory() as f64));
                }
            }
        }

        out.push(("RandomValue".to_string(), rand::thread_rng().gen::<f64>()));
        out
    }
}

/// One poll: store every finite reading and count the poll.
pub fn poll_once(sampler: &mut dyn Sampler, buffer: &MemoryStore) {
    let readings = sampler.sample();
    for (name, value) in &readings {
        if !value.is_finite() {
            tracing::debug!(%name, "skipping non-finite reading");
            continue;
        }
        buffer.set_gauge(name, *value);
    }
    buffer.add_counter(POLL_COUNT, 1);
    tracing::trace!(gauges = readings.len(), "poll complete");
}
