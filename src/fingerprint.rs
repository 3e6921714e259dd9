//! Query fingerprinting.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a normalized query and is
//! the key for both cache tiers. SHA-256 is stable across processes,
//! which the distributed tier requires.

use std::fmt;

use sha2::{Digest, Sha256};

/// Fixed-length digest of a normalized query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex encoding (64 chars).
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Trim, lower-case and collapse internal whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprint a query. Pure and deterministic.
pub fn fingerprint(text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    Fingerprint(hasher.finalize().into())
}
