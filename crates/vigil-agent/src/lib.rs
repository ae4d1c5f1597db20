//! vigil agent library entry.
//!
//! Samples local metrics into a buffer and reports them to the collector.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod reporter;
pub mod runner;
pub mod sampler;
pub mod transport;

pub use reporter::{ReportMode, ReportOutcome, Reporter};
pub use sampler::{Sampler, SystemSampler};
pub use transport::{HttpTransport, Transport, TransportError};
