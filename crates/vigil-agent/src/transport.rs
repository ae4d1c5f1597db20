//! Agent -> collector HTTP transport.
//!
//! JSON sends are gzipped; when a key is configured every request carries
//! an `HashSHA256` signature over the exact body bytes sent.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use thiserror::Error;

use vigil_core::integrity::SIGNATURE_HEADER;
use vigil_core::retry::{classify_http_status, Classify, ErrorClass};
use vigil_core::{codec, BatchStatus, IntegrityGuard, MetricRecord, VigilError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid collector address {0:?}")]
    Address(String),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("compress failed: {0}")]
    Compress(VigilError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collector returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable partial batch reply: {0}")]
    Reply(serde_json::Error),
}

impl Classify for TransportError {
    fn class(&self) -> ErrorClass {
        match self {
            TransportError::Status { status, .. } => classify_http_status(*status),
            // A request that could not even be built will not build next time.
            TransportError::Http(e) if e.is_builder() => ErrorClass::Fatal,
            TransportError::Http(_) => ErrorClass::Retriable,
            TransportError::Address(_)
            | TransportError::Encode(_)
            | TransportError::Compress(_)
            | TransportError::Reply(_) => ErrorClass::Fatal,
        }
    }
}

/// Delivery primitives used by the reporter. One call is one attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST /updates` with the whole batch. Returns the positions the
    /// collector did not store; empty when the batch went in whole.
    async fn send_batch(&self, records: &[MetricRecord]) -> Result<Vec<usize>, TransportError>;
    /// `POST /update` with one record.
    async fn send_one(&self, record: &MetricRecord) -> Result<(), TransportError>;
    /// `POST /update/{kind}/{name}/{value}`.
    async fn send_legacy(&self, record: &MetricRecord) -> Result<(), TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    guard: Option<IntegrityGuard>,
}

impl HttpTransport {
    pub fn new(address: &str, timeout: Duration, guard: Option<IntegrityGuard>) -> Result<Self, TransportError> {
        let base = base_url(address)?;
        let client = reqwest::Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self { client, base, guard })
    }

    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    /// Base URL plus path segments, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Address(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST and return the status and body of a 2xx reply.
    async fn post(&self, url: Url, body: Bytes, json_gzip: bool) -> Result<(StatusCode, Bytes), TransportError> {
        let mut req = self.client.post(url);
        req = if json_gzip {
            req.header(CONTENT_TYPE, "application/json").header(CONTENT_ENCODING, codec::GZIP)
        } else {
            req.header(CONTENT_TYPE, "text/plain")
        };
        if let Some(guard) = &self.guard {
            req = req.header(SIGNATURE_HEADER, guard.sign(&body));
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok((status, resp.bytes().await?));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Status { status: status.as_u16(), body })
    }

    fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes, TransportError> {
        let json = serde_json::to_vec(value)?;
        codec::gzip(&json).map_err(TransportError::Compress)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, records: &[MetricRecord]) -> Result<Vec<usize>, TransportError> {
        let body = Self::encode(records)?;
        let (status, reply) = self.post(self.endpoint(&["updates"])?, body, true).await?;
        if status != StatusCode::MULTI_STATUS {
            return Ok(Vec::new());
        }
        let partial: BatchStatus = serde_json::from_slice(&reply).map_err(TransportError::Reply)?;
        Ok(partial.failed)
    }

    async fn send_one(&self, record: &MetricRecord) -> Result<(), TransportError> {
        let body = Self::encode(record)?;
        self.post(self.endpoint(&["update"])?, body, true).await?;
        Ok(())
    }

    async fn send_legacy(&self, record: &MetricRecord) -> Result<(), TransportError> {
        let raw = match (record.value, record.delta) {
            (Some(v), _) => v.to_string(),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        };
        let url = self.endpoint(&["update", record.mtype.as_str(), record.id.as_str(), raw.as_str()])?;
        self.post(url, Bytes::new(), false).await?;
        Ok(())
    }
}

/// `host:port` or a full `http(s)://` URL.
fn base_url(address: &str) -> Result<Url, TransportError> {
    let a = address.trim().trim_end_matches('/');
    let full = if a.starts_with("http://") || a.starts_with("https://") {
        a.to_string()
    } else {
        format!("http://{a}")
    };
    Url::parse(&full).map_err(|_| TransportError::Address(address.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_http() {
        assert_eq!(base_url("localhost:8080").unwrap().as_str(), "http://localhost:8080/");
        assert_eq!(base_url("http://10.0.0.1:80/").unwrap().as_str(), "http://10.0.0.1/");
        assert!(base_url("http://").is_err());
    }

    #[test]
    fn legacy_segments_are_escaped() {
        let t = HttpTransport::new("localhost:8080", Duration::from_secs(1), None).unwrap();
        let url = t.endpoint(&["update", "gauge", "disk /var?x#1", "1.5"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/update/gauge/disk%20%2Fvar%3Fx%231/1.5");

        let t = HttpTransport::new("http://collector:9000/api/", Duration::from_secs(1), None).unwrap();
        assert_eq!(t.endpoint(&["updates"]).unwrap().as_str(), "http://collector:9000/api/updates");
    }

    #[test]
    fn status_classes() {
        let e = TransportError::Status { status: 502, body: String::new() };
        assert_eq!(e.class(), ErrorClass::Retriable);
        let e = TransportError::Status { status: 400, body: String::new() };
        assert_eq!(e.class(), ErrorClass::Fatal);
    }
}
