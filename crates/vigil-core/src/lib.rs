//! vigil core: metric model, validation contract, retry policy, payload
//! integrity and body codec.
//!
//! This crate defines the wire-level contracts and error surface shared by the
//! store, collector and agent crates. It carries no HTTP or database
//! dependencies so every side of the pipeline agrees on one definition of a
//! metric, a valid update, and a retriable failure.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `VigilError`/`Result` so a collector
//! does not crash on malformed input or bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod codec;
pub mod error;
pub mod integrity;
pub mod metric;
pub mod retry;
pub mod validate;

/// Shared result type.
pub use error::{ClientCode, Result, VigilError};
pub use integrity::IntegrityGuard;
pub use metric::{BatchStatus, MetricKind, MetricRecord, MetricUpdate, Snapshot};
pub use retry::{Backoff, Classify, ErrorClass, RetryError};
