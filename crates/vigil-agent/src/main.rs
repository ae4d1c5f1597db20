//! vigil agent
//!
//! Usage: `vigil-agent [config.yaml]`. Environment variables `ADDRESS`,
//! `POLL_INTERVAL`, `REPORT_INTERVAL` and `KEY` override the file.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_agent::{config, runner};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid agent config");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        collector = %cfg.collector.address,
        poll_secs = cfg.reporting.poll_interval_secs,
        report_secs = cfg.reporting.report_interval_secs,
        "vigil-agent starting"
    );

    match runner::run(&cfg, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "vigil-agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, stopping");
}
