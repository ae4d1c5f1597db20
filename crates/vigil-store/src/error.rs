//! Storage error type and its retry classification.

use thiserror::Error;
use vigil_core::retry::{classify_sqlstate, Classify, ErrorClass, RetryError};
use vigil_core::VigilError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file backend i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("file backend encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("database: {0}")]
    Sql(#[from] sqlx::Error),
    /// A backed-off write gave up; carries the attempt count and last cause.
    #[error("{0}")]
    Retry(Box<RetryError<StoreError>>),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl From<RetryError<StoreError>> for StoreError {
    fn from(e: RetryError<StoreError>) -> Self {
        StoreError::Retry(Box::new(e))
    }
}

impl StoreError {
    /// True when the backend itself could not be reached (as opposed to a
    /// rejected statement).
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Sql(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::Retry(r) => r.last().is_unavailable(),
            _ => false,
        }
    }
}

/// Only structured information is consulted: the SQLSTATE of a database
/// error, or the variant of a driver-level failure.
impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Sql(e) => classify_sqlx(e),
            StoreError::Timeout(_) => ErrorClass::Retriable,
            StoreError::Retry(r) => r.last().class(),
            StoreError::Io(_) | StoreError::Encoding(_) | StoreError::Unsupported(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

fn classify_sqlx(e: &sqlx::Error) -> ErrorClass {
    match e {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| classify_sqlstate(&code))
            .unwrap_or(ErrorClass::Fatal),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
            ErrorClass::Retriable
        }
        _ => ErrorClass::Fatal,
    }
}

impl From<StoreError> for VigilError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unsupported(what) => {
                VigilError::Unsupported(format!("{what} is not supported by this backend"))
            }
            other if other.is_unavailable() => VigilError::Unavailable(other.to_string()),
            other => VigilError::Internal(other.to_string()),
        }
    }
}
