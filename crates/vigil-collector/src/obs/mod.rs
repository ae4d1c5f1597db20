//! Lightweight in-process self-metrics, rendered by the `/metrics` handler.

pub mod metrics;
