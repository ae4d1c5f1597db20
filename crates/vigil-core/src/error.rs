//! Shared error type across vigil crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed or contradictory metric.
    BadRequest,
    /// Metric (or kind) not known to the collector.
    NotFound,
    /// Payload signature missing or wrong.
    Integrity,
    /// Payload too large.
    PayloadTooLarge,
    /// Operation not supported by the configured backend.
    Unsupported,
    /// Backend temporarily unreachable.
    Unavailable,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Integrity => "INTEGRITY",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::Unsupported => "UNSUPPORTED",
            ClientCode::Unavailable => "UNAVAILABLE",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Unified error type used by core, collector and agent.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl VigilError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            VigilError::BadRequest(_) => ClientCode::BadRequest,
            VigilError::NotFound(_) => ClientCode::NotFound,
            VigilError::Integrity(_) => ClientCode::Integrity,
            VigilError::PayloadTooLarge => ClientCode::PayloadTooLarge,
            VigilError::Unsupported(_) => ClientCode::Unsupported,
            VigilError::Unavailable(_) => ClientCode::Unavailable,
            VigilError::Internal(_) => ClientCode::Internal,
        }
    }
}
