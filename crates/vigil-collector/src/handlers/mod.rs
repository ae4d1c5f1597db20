//! Metric HTTP handlers: dashboard, legacy path protocol, JSON protocol.

pub mod index;
pub mod json;
pub mod legacy;
