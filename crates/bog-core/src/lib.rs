//! Bog Core - Core types and primitives for the bog signed content log.
//!
//! This crate provides:
//! - Content hashing (canonical 44-character base64 SHA-256 digests)
//! - Keypair lifecycle (ed25519, persisted as one concatenated string)
//! - The signed envelope codec (sign / open)
//! - Timestamps (13-digit decimal milliseconds)
//! - Metadata documents (front-matter plus body)

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod envelope;
pub mod hash;
pub mod keypair;
pub mod meta;
pub mod time;

pub use envelope::{author_of, open, sign, sign_at, Payload};
pub use hash::{digest, Hash};
pub use keypair::Keypair;
pub use meta::MetaDoc;
pub use time::Timestamp;

/// Length of a canonical content hash: base64 of a 32-byte SHA-256 digest.
pub const HASH_LEN: usize = 44;

/// Length of a timestamp rendered as decimal milliseconds.
pub const TIMESTAMP_LEN: usize = 13;

/// Length of an opened envelope payload: timestamp followed by a content hash.
pub const PAYLOAD_LEN: usize = TIMESTAMP_LEN + HASH_LEN;

/// Length of a persisted keypair string: public key + base64 keypair bytes.
pub const KEYPAIR_LEN: usize = HASH_LEN + 88;
