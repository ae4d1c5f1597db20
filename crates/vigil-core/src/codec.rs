//! Gzip body codec shared by the agent (encode) and collector (decode).
//!
//! Decoding is bounded: inflating past `limit` bytes is reported as
//! `PayloadTooLarge` instead of buffering an arbitrarily large body.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, VigilError};

/// Value of the `Content-Encoding` header for compressed bodies.
pub const GZIP: &str = "gzip";

/// Gzip `data`.
pub fn gzip(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| VigilError::Internal(format!("gzip encode failed: {e}")))?;
    let out = encoder
        .finish()
        .map_err(|e| VigilError::Internal(format!("gzip finish failed: {e}")))?;
    Ok(Bytes::from(out))
}

/// Inflate a gzip body, refusing output larger than `limit` bytes.
pub fn gunzip(data: &[u8], limit: usize) -> Result<Bytes> {
    let mut out = Vec::new();
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VigilError::BadRequest(format!("invalid gzip body: {e}")))?;
    if out.len() > limit {
        return Err(VigilError::PayloadTooLarge);
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn inflates_what_it_deflates() {
        let body = br#"[{"id":"PollCount","type":"counter","delta":1}]"#;
        let packed = gzip(body).unwrap();
        assert_ne!(&packed[..], &body[..]);
        assert_eq!(&gunzip(&packed, 1024).unwrap()[..], &body[..]);
    }

    #[test]
    fn rejects_plain_bytes() {
        let err = gunzip(b"not gzip at all", 1024).unwrap_err();
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
    }

    #[test]
    fn enforces_limit() {
        let packed = gzip(&vec![b'a'; 4096]).unwrap();
        let err = gunzip(&packed, 1024).unwrap_err();
        assert_eq!(err.client_code().as_str(), "PAYLOAD_TOO_LARGE");
    }
}
