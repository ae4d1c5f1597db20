//! vigil collector library entry.
//!
//! This crate wires configuration, the metric store, HTTP middleware and
//! handlers into the collector service. It is consumed by the binary
//! (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod error;
pub mod handlers;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;
