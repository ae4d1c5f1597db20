//! vigil collector
//!
//! Usage: `vigil-collector [config.yaml]`. Environment variables `ADDRESS`,
//! `STORE_INTERVAL`, `FILE_STORAGE_PATH`, `RESTORE`, `DATABASE_DSN` and `KEY`
//! override the file.

use std::process::ExitCode;

use axum::extract::Request;
use axum::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_collector::{app_state::AppState, config, router};
use vigil_core::error::{Result, VigilError};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "vigil-collector failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let cfg = config::load(&path)?;
    let listen = cfg.server.listen.clone();

    let state = AppState::open(cfg).await?;
    let app = router::build_app(state.clone());

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| VigilError::Internal(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, backend = state.store().kind(), "vigil-collector starting");

    let served = axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| VigilError::Internal(format!("server failed: {e}")));

    if let Err(e) = state.store().shutdown().await {
        tracing::error!(error = %e, "storage shutdown failed");
    }
    served
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
    tracing::info!("signal received, starting graceful shutdown");
}
