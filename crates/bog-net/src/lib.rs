//! Bog Net - The replication endpoint.
//!
//! Peers exchange text frames over persistent bidirectional connections.
//! Each inbound frame is classified exactly once at the protocol boundary
//! ([`Frame`]), then handled by the [`Endpoint`]: hash references are
//! answered from local state or turned into gossip, raw payloads are
//! ingested and fanned out. The same listener also serves the HTTP query
//! directory.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod dial;
pub mod endpoint;
pub mod frame;
pub mod http;
pub mod peers;

pub use endpoint::Endpoint;
pub use frame::Frame;
pub use peers::{PeerId, PeerSet};

use thiserror::Error;

/// Errors from network operations.
#[derive(Debug, Error)]
pub enum NetError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error on an outbound connection
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Log operation failed
    #[error(transparent)]
    Log(#[from] bog_log::LogError),
}
