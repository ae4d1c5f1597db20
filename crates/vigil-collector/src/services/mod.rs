//! Collector-side services behind the HTTP handlers.

pub mod ingest;
