//! HTTP transport middleware.
//!
//! Request path, outermost first:
//! access log -> response compression -> response signing ->
//! signature verification (raw wire bytes) -> gzip decoding -> handler.

pub mod access_log;
pub mod gzip;
pub mod integrity;
