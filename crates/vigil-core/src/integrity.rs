//! Keyed payload signatures (HMAC-SHA256, hex encoded).
//!
//! The signature always covers the exact bytes on the wire, i.e. the
//! compressed body when gzip is in use. Receivers verify before decompressing
//! or parsing anything. Without a configured key there is no guard at all and
//! callers skip signing/verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, VigilError};

/// Request/response header carrying the signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payloads with a shared secret.
#[derive(Clone)]
pub struct IntegrityGuard {
    mac: HmacSha256,
}

impl std::fmt::Debug for IntegrityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IntegrityGuard(..)")
    }
}

impl IntegrityGuard {
    /// Returns `None` for an empty key: integrity checking is opt-in.
    pub fn from_key(key: &str) -> Option<Self> {
        if key.is_empty() {
            return None;
        }
        let mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
        Some(Self { mac })
    }

    /// Hex signature of `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify `payload` against the received header value (constant time).
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<()> {
        let sig = signature.ok_or(VigilError::Integrity("missing HashSHA256 header"))?;
        let raw = hex::decode(sig.trim())
            .map_err(|_| VigilError::Integrity("malformed HashSHA256 header"))?;

        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(&raw)
            .map_err(|_| VigilError::Integrity("signature mismatch"))
    }
}
