//! Content-addressed identifiers.
//!
//! `id(x) = hex(sha256(canonical(x)))`. The id is computed from the exact
//! record content that will be stored, so re-presenting identical creation
//! inputs always resolves to the same row.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::canonical::canonicalize;
use crate::domain::errors::CoreResult;

/// Length of the short display form.
pub const SHORT_ID_LEN: usize = 8;

/// Derive the 64-hex content id of an I-JSON value.
pub fn content_id(value: &Value) -> CoreResult<String> {
    let canonical = canonicalize(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// First eight hex characters, used in rendered output and prompts.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(SHORT_ID_LEN)]
}

/// A valid id is exactly 64 lowercase hex characters.
pub fn is_valid_id(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
