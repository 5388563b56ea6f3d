//! Keypair lifecycle.
//!
//! A local identity is one ed25519 keypair, persisted under the store key
//! `keypair` as a single concatenated string: the first 44 characters are the
//! base64 public key, the remainder the base64 keypair bytes. Generation
//! never persists; callers decide where the keypair lives.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{HASH_LEN, KEYPAIR_LEN};

/// Errors from keypair parsing.
#[derive(Debug, Error)]
pub enum KeypairError {
    /// The concatenated string has the wrong length.
    #[error("keypair string has length {0}, expected {KEYPAIR_LEN}")]
    Length(usize),
    /// The keypair bytes are not valid base64.
    #[error("keypair is not valid base64")]
    Encoding,
    /// The decoded bytes are not a valid ed25519 keypair.
    #[error("invalid ed25519 keypair")]
    Key,
    /// The embedded public key does not match the secret half.
    #[error("public key does not match secret key")]
    Mismatch,
}

/// An ed25519 signing identity.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generates a fresh keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Returns the public key as its canonical 44-character base64 form.
    pub fn pubkey(&self) -> String {
        BASE64.encode(self.signing.verifying_key().as_bytes())
    }

    /// Returns the secret half as its 88-character base64 form: the full
    /// ed25519 keypair bytes.
    pub fn privkey(&self) -> String {
        BASE64.encode(self.signing.to_keypair_bytes())
    }

    /// Serializes to the persisted concatenated form: pubkey + keypair bytes.
    pub fn to_concat(&self) -> String {
        let mut out = self.pubkey();
        out.push_str(&self.privkey());
        out
    }

    /// Parses the persisted concatenated form.
    pub fn from_concat(s: &str) -> Result<Self, KeypairError> {
        if s.len() != KEYPAIR_LEN {
            return Err(KeypairError::Length(s.len()));
        }
        // Byte 44 of a corrupted string may not be a char boundary.
        let pubkey = s.get(..HASH_LEN).ok_or(KeypairError::Encoding)?;
        let rest = s.get(HASH_LEN..).ok_or(KeypairError::Encoding)?;
        let bytes = BASE64.decode(rest).map_err(|_| KeypairError::Encoding)?;
        let bytes: [u8; 64] = bytes.try_into().map_err(|_| KeypairError::Key)?;
        let signing = SigningKey::from_keypair_bytes(&bytes).map_err(|_| KeypairError::Key)?;
        if BASE64.encode(signing.verifying_key().as_bytes()) != pubkey {
            return Err(KeypairError::Mismatch);
        }
        Ok(Self { signing })
    }

    /// Signs a payload, returning the 64-byte detached signature.
    pub fn sign_payload(&self, payload: &[u8]) -> [u8; 64] {
        self.signing.sign(payload).to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", &self.pubkey()[..8])
    }
}

/// Verifies a detached signature against a 44-character base64 public key.
pub(crate) fn verify(pubkey: &str, payload: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(bytes) = BASE64.decode(pubkey) else {
        return false;
    };
    let Ok(bytes) = <[u8; 32]>::try_from(bytes) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&bytes) else {
        return false;
    };
    key.verify_strict(payload, &Signature::from_bytes(signature))
        .is_ok()
}
