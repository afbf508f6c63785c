//! Canonical hashing: sha256(JCS(JSON(value))).
//!
//! JCS (RFC 8785) sorts object keys and fixes number/string encoding, so the
//! digest depends only on content, never on field or map iteration order.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{SkillsError, SkillsResult};

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex-encoded SHA-256 of the JCS canonical form of `value`.
pub fn canonical_digest<T: Serialize + ?Sized>(what: &str, value: &T) -> SkillsResult<String> {
    let canonical = serde_jcs::to_string(value).map_err(|e| SkillsError::Serialize {
        what: what.to_string(),
        message: e.to_string(),
    })?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// True for exactly 64 hex characters.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
