//! Failure classification and fixed-schedule backoff.
//!
//! `Backoff` is the single retry algorithm used by the agent's network sends
//! and by the relational store's writes. A schedule entry is the wait before
//! one attempt, so a schedule of N entries allows at most N attempts:
//! - network: `[0, 1s, 3s, 5s]`
//! - storage: immediate attempt, then retries after 1s, 3s, 5s (same shape)
//!
//! Whether an error is worth another attempt is decided by its `Classify`
//! impl, which must look at structured codes only (SQLSTATE, HTTP status,
//! transport error kind) and never at message text.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Outcome class of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Re-attempting the same operation may plausibly succeed.
    Retriable,
    /// Re-attempting cannot help (bad input, constraint, auth).
    Fatal,
}

/// Implemented by every error type that flows through `Backoff`.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Classify a PostgreSQL SQLSTATE code.
///
/// Retriable: connection exceptions (08), serialization failure (40001),
/// deadlock (40P01), insufficient resources (53), operator intervention /
/// shutdown (57P01..57P03), system errors (58). Everything else is fatal,
/// including data exceptions (22), constraint violations (23), auth (28) and
/// syntax/schema errors (42).
pub fn classify_sqlstate(code: &str) -> ErrorClass {
    match code {
        "40001" | "40P01" | "57P01" | "57P02" | "57P03" => ErrorClass::Retriable,
        c if c.starts_with("08") || c.starts_with("53") || c.starts_with("58") => {
            ErrorClass::Retriable
        }
        _ => ErrorClass::Fatal,
    }
}

/// Classify an HTTP response status: 5xx, 408 and 429 are transient.
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 | 500..=599 => ErrorClass::Retriable,
        _ => ErrorClass::Fatal,
    }
}

/// Error returned by `Backoff::run`.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a fatal error; no further attempts were made.
    #[error("{source} (fatal, attempt {attempts})")]
    Fatal {
        attempts: usize,
        #[source]
        source: E,
    },
    /// Every scheduled attempt failed with a retriable error.
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The last underlying cause.
    pub fn last(&self) -> &E {
        match self {
            RetryError::Fatal { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn into_last(self) -> E {
        match self {
            RetryError::Fatal { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }
}

/// Fixed delay schedule executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    schedule: Vec<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::network()
    }
}

impl Backoff {
    /// Build from explicit pre-attempt delays. An empty schedule still makes
    /// one immediate attempt.
    pub fn new(schedule: Vec<Duration>) -> Self {
        if schedule.is_empty() {
            return Self::once();
        }
        Self { schedule }
    }

    /// Build from whole seconds (config-friendly).
    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Agent -> collector sends.
    pub fn network() -> Self {
        Self::from_secs(&[0, 1, 3, 5])
    }

    /// Relational store writes: immediate try, then 1s, 3s, 5s.
    pub fn storage() -> Self {
        Self::from_secs(&[0, 1, 3, 5])
    }

    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self { schedule: vec![Duration::ZERO] }
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> usize {
        self.schedule.len()
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Run `op` until it succeeds, fails fatally, or the schedule runs out.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let total = self.schedule.len();
        let mut attempt = 0;

        loop {
            if let Some(delay) = self.schedule.get(attempt).filter(|d| !d.is_zero()) {
                tokio::time::sleep(*delay).await;
            }
            attempt += 1;

            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.class() == ErrorClass::Fatal => {
                    return Err(RetryError::Fatal { attempts: attempt, source: e });
                }
                Err(e) if attempt >= total => {
                    return Err(RetryError::Exhausted { attempts: attempt, source: e });
                }
                Err(e) => {
                    let next_delay_ms = self
                        .schedule
                        .get(attempt)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or_default();
                    tracing::warn!(attempt, max = total, next_delay_ms, error = %e, "retriable failure, backing off");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Flaky(ErrorClass);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky({:?})", self.0)
        }
    }

    impl Classify for Flaky {
        fn class(&self) -> ErrorClass {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_failure_uses_every_attempt() {
        let calls = &AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let res: Result<(), _> = Backoff::network()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(ErrorClass::Retriable))
            })
            .await;

        let err = res.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(9));
        assert!(err.to_string().contains("failed after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_stops_at_first_attempt() {
        let calls = &AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let res: Result<(), _> = Backoff::network()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(ErrorClass::Fatal))
            })
            .await;

        assert!(matches!(res, Err(RetryError::Fatal { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_a_later_attempt() {
        let calls = &AtomicUsize::new(0);

        let res = Backoff::storage()
            .run(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Flaky(ErrorClass::Retriable))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_schedule_still_attempts_once() {
        let calls = &AtomicUsize::new(0);
        let b = Backoff::new(Vec::new());
        assert_eq!(b.max_attempts(), 1);

        let res: Result<(), _> = b
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(ErrorClass::Retriable))
            })
            .await;
        assert_eq!(res.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sqlstate_classes() {
        assert_eq!(classify_sqlstate("08006"), ErrorClass::Retriable);
        assert_eq!(classify_sqlstate("40001"), ErrorClass::Retriable);
        assert_eq!(classify_sqlstate("40P01"), ErrorClass::Retriable);
        assert_eq!(classify_sqlstate("57P01"), ErrorClass::Retriable);
        assert_eq!(classify_sqlstate("23505"), ErrorClass::Fatal);
        assert_eq!(classify_sqlstate("28P01"), ErrorClass::Fatal);
        assert_eq!(classify_sqlstate("42P01"), ErrorClass::Fatal);
        assert_eq!(classify_sqlstate("22003"), ErrorClass::Fatal);
    }

    #[test]
    fn http_status_classes() {
        assert_eq!(classify_http_status(503), ErrorClass::Retriable);
        assert_eq!(classify_http_status(429), ErrorClass::Retriable);
        assert_eq!(classify_http_status(400), ErrorClass::Fatal);
        assert_eq!(classify_http_status(404), ErrorClass::Fatal);
    }
}
