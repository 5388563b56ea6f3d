//! Content hashing.
//!
//! Every blob in the system is addressed by the standard-base64 encoding of
//! its SHA-256 digest: a fixed 44-character string that doubles as the
//! storage key and the wire representation of a hash reference.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::HASH_LEN;

/// A canonical content hash: 44 characters of standard base64.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Validates a string as a canonical hash.
    ///
    /// Accepts exactly [`HASH_LEN`] characters that decode as base64 to a
    /// 32-byte digest. Anything else is not a hash reference.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != HASH_LEN {
            return None;
        }
        match BASE64.decode(s) {
            Ok(bytes) if bytes.len() == 32 => Some(Self(s.to_string())),
            _ => None,
        }
    }

    /// Returns the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.0[..8])
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

/// Computes the canonical content hash of a byte sequence.
pub fn digest(data: &[u8]) -> Hash {
    let bytes = Sha256::digest(data);
    Hash(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_vector() {
        // SHA-256("hello") = 2cf24dba...
        let hash = digest(b"hello");
        assert_eq!(hash.as_str(), "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=");
        assert_eq!(hash.as_str().len(), HASH_LEN);
    }

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(digest(b"same input"), digest(b"same input"));
        assert_ne!(digest(b"one"), digest(b"two"));
    }

    #[test]
    fn test_parse_accepts_digest_output() {
        let hash = digest(b"anything");
        let parsed = Hash::parse(hash.as_str()).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(Hash::parse("short").is_none());
        assert!(Hash::parse(&"a".repeat(45)).is_none());
        assert!(Hash::parse("").is_none());
    }

    #[test]
    fn test_parse_rejects_non_base64() {
        let not_base64 = format!("{}!", &"a".repeat(43));
        assert!(Hash::parse(&not_base64).is_none());
    }
}
