//! Keyed message authentication for protocol frames.
//!
//! Tags are HMAC-SHA-256 over the exact serialized payload bytes, keyed by
//! the UTF-8 bytes of the shared secret, rendered as lowercase hex.

// ============================================================================
// Imports
// ============================================================================

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Functions
// ============================================================================

/// Computes the authentication tag for `payload`.
///
/// # Errors
///
/// Returns [`Error::Signature`] if `secret` is empty.
pub fn sign(payload: &[u8], secret: &str) -> Result<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `tag` against the tag computed for `payload`.
///
/// Returns `false` for an empty tag, a tag that is not hex, an empty
/// secret, or any mismatch.
#[must_use]
pub fn verify(payload: &[u8], tag: &str, secret: &str) -> bool {
    if tag.is_empty() {
        return false;
    }

    let Ok(expected) = hex::decode(tag) else {
        return false;
    };

    let Ok(mut mac) = keyed_mac(secret) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn keyed_mac(secret: &str) -> Result<HmacSha256> {
    if secret.is_empty() {
        return Err(Error::signature("Secret key is empty"));
    }

    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::signature(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
