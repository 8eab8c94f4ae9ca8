//! Content-addressed job identity.
//!
//! A [`JobKey`] is the SHA-256 of the *entire* serialized request, not just
//! the source text: the same markup compiled with a different engine, DPI,
//! or format is a different job and must not share a workspace. SHA-256
//! (not a checksum) because the key names a directory shared by nothing
//! else; an accidental collision between unrelated requests would let one
//! job read another's files.
//!
//! Serialization goes through `serde_json::to_string` of the struct, whose
//! field order is fixed, so the key is deterministic across process
//! restarts. Two requests that differ only in the whitespace of their own
//! wire form parse to the same struct and therefore the same key.

use crate::error::BuildError;
use crate::request::BuildRequest;
use sha2::{Digest, Sha256};
use std::fmt;

/// A 64-character lowercase-hex SHA-256 digest identifying one build job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    /// Compute the key for a request. Pure; no side effects.
    pub fn compute(request: &BuildRequest) -> Result<Self, BuildError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| BuildError::Internal(format!("request serialization: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        Ok(JobKey(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
