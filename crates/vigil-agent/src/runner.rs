//! Poll and report loops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use vigil_core::IntegrityGuard;
use vigil_store::MemoryStore;

use crate::config::AgentConfig;
use crate::reporter::Reporter;
use crate::sampler::{poll_once, Sampler, SystemSampler};
use crate::transport::{HttpTransport, Transport, TransportError};

/// Build the HTTP reporter described by `cfg` over a fresh buffer.
pub fn http_reporter(cfg: &AgentConfig) -> Result<Reporter<HttpTransport>, TransportError> {
    let guard = IntegrityGuard::from_key(&cfg.collector.key);
    let transport = HttpTransport::new(&cfg.collector.address, cfg.request_timeout(), guard)?;
    tracing::info!(collector = %transport.base(), signed = !cfg.collector.key.is_empty(), "transport ready");

    Ok(Reporter::new(transport, Arc::new(MemoryStore::new()), cfg.backoff())
        .with_policy(cfg.reporting.fallback)
        .with_protocol(cfg.collector.protocol))
}

/// Run the agent with the system sampler until `shutdown` resolves.
pub async fn run<F>(cfg: &AgentConfig, shutdown: F) -> Result<(), TransportError>
where
    F: Future<Output = ()>,
{
    let reporter = http_reporter(cfg)?;
    run_with(
        reporter,
        Box::new(SystemSampler::new()),
        cfg.poll_interval(),
        cfg.report_interval(),
        shutdown,
    )
    .await;
    Ok(())
}

/// Two independent cadences sharing the reporter's buffer: the poll task
/// samples immediately and then every `poll`; reports start one `report`
/// interval in.
pub async fn run_with<T, F>(
    mut reporter: Reporter<T>,
    mut sampler: Box<dyn Sampler>,
    poll: Duration,
    report: Duration,
    shutdown: F,
) where
    T: Transport,
    F: Future<Output = ()>,
{
    let buffer = reporter.buffer().clone();
    let poller = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            poll_once(sampler.as_mut(), &buffer);
        }
    });

    let mut ticker = tokio::time::interval(report);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let outcome = reporter.report_once().await;
                tracing::info!(mode = ?outcome.mode, sent = outcome.sent, dropped = outcome.dropped.len(), "report tick");
            }
        }
    }

    poller.abort();
    tracing::info!("agent stopped");
}
