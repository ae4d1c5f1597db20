//! Axum router wiring.
//!
//! Trailing slashes are trimmed before routing, so `/update/` and `/update`
//! reach the same handler. That happens outside the `Router`, which is why
//! `build_app` returns a wrapped service rather than a `Router`.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::{Layer, ServiceBuilder};
use tower_http::compression::CompressionLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

use crate::app_state::AppState;
use crate::{handlers, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let limit = state.cfg().server.max_body_bytes;

    Router::new()
        .route("/", get(handlers::index::index))
        .route("/update", post(handlers::json::update))
        .route("/updates", post(handlers::json::updates))
        .route("/value", post(handlers::json::value))
        .route("/update/:kind/:name/:value", post(handlers::legacy::update))
        .route("/value/:kind/:name", get(handlers::legacy::value))
        .route("/ping", get(ops::ping))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), transport::access_log::access_log))
                .layer(CompressionLayer::new())
                .layer(from_fn_with_state(state.clone(), transport::integrity::sign_response))
                .layer(from_fn_with_state(state.clone(), transport::integrity::verify_request))
                .layer(from_fn_with_state(state.clone(), transport::gzip::decode_request))
                .layer(DefaultBodyLimit::max(limit)),
        )
        .with_state(state)
}

/// The router behind trailing-slash normalization; serve this.
pub fn build_app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(state))
}
