//! Report protocol.
//!
//! Each tick takes the buffer's current state and pushes it to the
//! collector: gzipped JSON batch first, per-metric sends when the batch
//! fails (or the legacy path-encoded protocol when configured).
//!
//! Counter values in the buffer are deltas pending delivery. A delivered
//! delta is subtracted from the buffer, so increments that land between
//! the snapshot and the settle carry over to the next tick. Gauges are
//! resent every tick and simply overwritten by the next poll.

use std::sync::Arc;

use vigil_core::{Backoff, MetricRecord};
use vigil_store::MemoryStore;

use crate::config::{FallbackPolicy, Protocol};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Nothing pending.
    Idle,
    Batch,
    /// Batch accepted in part; the rest went one by one.
    PartialBatch,
    /// Batch failed (or was skipped); metrics went one by one.
    PerItem,
    Legacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub mode: ReportMode,
    pub sent: usize,
    /// Metrics not delivered this tick.
    pub dropped: Vec<String>,
}

pub struct Reporter<T> {
    transport: T,
    buffer: Arc<MemoryStore>,
    backoff: Backoff,
    policy: FallbackPolicy,
    protocol: Protocol,
    degraded: bool,
}

impl<T: Transport> Reporter<T> {
    pub fn new(transport: T, buffer: Arc<MemoryStore>, backoff: Backoff) -> Self {
        Self {
            transport,
            buffer,
            backoff,
            policy: FallbackPolicy::default(),
            protocol: Protocol::default(),
            degraded: false,
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn buffer(&self) -> &Arc<MemoryStore> {
        &self.buffer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True once a batch send has failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Records to send this tick: every gauge and every non-zero counter delta.
    fn pending(&self) -> Vec<MetricRecord> {
        let snap = self.buffer.to_snapshot();
        let mut out = Vec::with_capacity(snap.len());
        for (name, value) in &snap.gauges {
            out.push(MetricRecord::gauge(name.clone(), *value));
        }
        for (name, delta) in &snap.counters {
            if *delta != 0 {
                out.push(MetricRecord::counter(name.clone(), *delta));
            }
        }
        out
    }

    fn settle(&self, record: &MetricRecord) {
        if let Some(delta) = record.delta {
            self.buffer.add_counter(&record.id, -delta);
        }
    }

    pub async fn report_once(&mut self) -> ReportOutcome {
        let records = self.pending();
        if records.is_empty() {
            return ReportOutcome { mode: ReportMode::Idle, sent: 0, dropped: Vec::new() };
        }

        if self.protocol == Protocol::Legacy {
            return self.send_each(&records, ReportMode::Legacy).await;
        }

        let skip_batch = self.degraded && self.policy == FallbackPolicy::StayDegraded;
        if !skip_batch {
            match self.backoff.run(|| self.transport.send_batch(&records)).await {
                Ok(failed) if failed.is_empty() => {
                    records.iter().for_each(|r| self.settle(r));
                    self.degraded = false;
                    tracing::debug!(sent = records.len(), "batch delivered");
                    return ReportOutcome { mode: ReportMode::Batch, sent: records.len(), dropped: Vec::new() };
                }
                Ok(failed) => {
                    self.degraded = false;
                    return self.finish_partial(records, &failed).await;
                }
                Err(e) => {
                    tracing::warn!(attempts = e.attempts(), error = %e.last(), "batch send failed, falling back to per-metric sends");
                    self.degraded = true;
                }
            }
        }

        self.send_each(&records, ReportMode::PerItem).await
    }

    /// Settle what the collector stored and resend only the rest. Stored
    /// elements are never sent again, so their deltas count once.
    async fn finish_partial(&self, records: Vec<MetricRecord>, failed: &[usize]) -> ReportOutcome {
        let (retry, stored): (Vec<_>, Vec<_>) = records
            .into_iter()
            .enumerate()
            .partition(|(pos, _)| failed.contains(pos));
        stored.iter().for_each(|(_, r)| self.settle(r));
        tracing::warn!(stored = stored.len(), resend = retry.len(), "batch partially stored");

        let retry: Vec<MetricRecord> = retry.into_iter().map(|(_, r)| r).collect();
        let rest = self.send_each(&retry, ReportMode::PerItem).await;
        ReportOutcome {
            mode: ReportMode::PartialBatch,
            sent: stored.len() + rest.sent,
            dropped: rest.dropped,
        }
    }

    async fn send_each(&self, records: &[MetricRecord], mode: ReportMode) -> ReportOutcome {
        let mut sent = 0;
        let mut dropped = Vec::new();

        for record in records {
            let result = if mode == ReportMode::Legacy {
                self.backoff.run(|| self.transport.send_legacy(record)).await
            } else {
                self.backoff.run(|| self.transport.send_one(record)).await
            };
            match result {
                Ok(()) => {
                    self.settle(record);
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(metric = %record.id, kind = %record.mtype, attempts = e.attempts(), error = %e.last(), "metric dropped for this tick");
                    dropped.push(record.id.clone());
                }
            }
        }

        ReportOutcome { mode, sent, dropped }
    }
}
