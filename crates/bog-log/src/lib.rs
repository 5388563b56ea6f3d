//! Bog Log - The authoritative hash log.
//!
//! Owns the ordered sequence of verified envelope hashes and its decoded
//! view, and is the only component allowed to mutate either. Provides:
//! - `add` - verify and append an envelope
//! - `rebuild` - the self-healing integrity and re-sort pass
//! - `purge_author` - cascading tombstone for one author
//! - `query` / `get_latest` - snapshot reads that never block writers
//! - coalesced persistence of both logs under fixed store keys

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod entry;
pub mod keys;
pub mod manager;
pub mod tasks;

pub use entry::LogEntry;
pub use manager::{LogManager, PurgeStats};

use thiserror::Error;

/// Errors from log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] bog_store::StoreError),

    /// Persisted log state could not be decoded.
    #[error("persisted log state is not valid JSON: {0}")]
    Persisted(#[from] serde_json::Error),

    /// An operation that signs content was attempted without a keypair.
    #[error("no keypair available")]
    NoKeypair,
}
