//! The signed envelope codec.
//!
//! An envelope binds a public key, a timestamp, and a content hash:
//!
//! ```text
//! envelope = pubkey(44 chars) + base64(signature(64 bytes) || payload)
//! payload  = timestamp(13-digit decimal ms) + content_hash(44 chars)
//! ```
//!
//! The payload is recoverable only through successful signature verification
//! against the embedded public key ([`open`]). Envelopes are themselves
//! stored as blobs, so `digest(envelope)` is the key that references them in
//! the hash log.
//!
//! Timestamps are embedded by the signer, not assigned by a receiver, so log
//! ordering trusts the peer's clock. That is a property of the protocol, not
//! a bug in this module.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::hash::Hash;
use crate::keypair::{verify, Keypair};
use crate::time::Timestamp;
use crate::{HASH_LEN, PAYLOAD_LEN, TIMESTAMP_LEN};

/// A verified, decoded envelope payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Signing time, as embedded by the signer.
    pub ts: Timestamp,
    /// Hash of the content the envelope refers to.
    pub content: Hash,
}

impl Payload {
    /// Parses the `timestamp + content_hash` payload shape.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != PAYLOAD_LEN {
            return None;
        }
        // Indexing by byte offset must respect char boundaries; a signed
        // payload can carry arbitrary utf-8.
        let ts = Timestamp::parse_text(s.get(..TIMESTAMP_LEN)?)?;
        let content = Hash::parse(s.get(TIMESTAMP_LEN..)?)?;
        Some(Self { ts, content })
    }
}

/// Signs a content hash, producing an envelope timestamped with the current
/// wall clock.
pub fn sign(content: &Hash, keypair: &Keypair) -> String {
    sign_at(content, keypair, Timestamp::now())
}

/// Signs a content hash with an explicit timestamp.
pub fn sign_at(content: &Hash, keypair: &Keypair, ts: Timestamp) -> String {
    let payload = format!("{}{}", ts.to_text(), content);
    let signature = keypair.sign_payload(payload.as_bytes());

    let mut signed = Vec::with_capacity(64 + payload.len());
    signed.extend_from_slice(&signature);
    signed.extend_from_slice(payload.as_bytes());

    let mut envelope = keypair.pubkey();
    envelope.push_str(&BASE64.encode(signed));
    envelope
}

/// Opens an envelope, returning the payload text on successful verification.
///
/// Returns `None` for anything that is not a well-formed, validly signed
/// envelope: wrong length, missing base64 termination, decode failure, short
/// signature block, bad signature, or a non-utf8 payload. Malformed input is
/// an expected condition at this boundary and never raises.
pub fn open(envelope: &str) -> Option<String> {
    if envelope.len() <= HASH_LEN {
        return None;
    }
    // Wire frames are arbitrary utf-8; byte offset 44 may fall inside a
    // multi-byte character, so split fallibly instead of indexing.
    let pubkey = envelope.get(..HASH_LEN)?;
    let rest = envelope.get(HASH_LEN..)?;
    // A signed payload is 64 + 57 bytes, which base64-encodes with trailing
    // double padding. Cheap shape check before decoding.
    if !rest.ends_with("==") {
        return None;
    }
    let signed = BASE64.decode(rest).ok()?;
    if signed.len() <= 64 {
        return None;
    }
    let (signature, payload) = signed.split_at(64);
    let signature: [u8; 64] = signature.try_into().ok()?;
    if !verify(pubkey, payload, &signature) {
        return None;
    }
    String::from_utf8(payload.to_vec()).ok()
}

/// Returns the author of an envelope: its leading public key.
///
/// Purely positional; only [`open`] establishes that the envelope is
/// authentic.
pub fn author_of(envelope: &str) -> Option<&str> {
    envelope.get(..HASH_LEN)
}
