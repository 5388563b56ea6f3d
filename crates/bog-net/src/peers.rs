//! The connected peer set.
//!
//! Each live connection registers an outbound text channel here under a
//! process-unique id. Everything above the transport addresses peers through
//! this set, so inbound WebSocket connections and outbound dials look the
//! same to the endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bog_core::Hash;
use bog_gossip::RequestSink;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound channel depth per peer. A peer that falls this far behind
/// starts dropping frames rather than backpressuring the whole node.
pub const PEER_CHANNEL_CAPACITY: usize = 256;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl PeerId {
    fn next() -> Self {
        PeerId(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// All currently connected peers.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<PeerId, mpsc::Sender<String>>>,
}

impl PeerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound channel and returns its id.
    pub fn add(&self, tx: mpsc::Sender<String>) -> PeerId {
        let id = PeerId::next();
        self.peers.write().insert(id, tx);
        debug!(%id, "peer connected");
        id
    }

    /// Drops a connection from the set.
    pub fn remove(&self, id: PeerId) {
        if self.peers.write().remove(&id).is_some() {
            debug!(%id, "peer disconnected");
        }
    }

    /// Sends one frame to one peer. Returns false if the peer is gone or
    /// its channel is full; the frame is dropped either way.
    pub fn send(&self, id: PeerId, text: &str) -> bool {
        let peers = self.peers.read();
        match peers.get(&id) {
            Some(tx) => tx.try_send(text.to_string()).is_ok(),
            None => false,
        }
    }

    /// Sends one frame to every connected peer, best-effort.
    pub fn broadcast(&self, text: &str) {
        for tx in self.peers.read().values() {
            let _ = tx.try_send(text.to_string());
        }
    }

    /// Sends one frame to every connected peer except `origin`. Used for
    /// fan-out, where echoing a frame back to its sender only wastes a
    /// round trip.
    pub fn broadcast_except(&self, origin: PeerId, text: &str) {
        for (id, tx) in self.peers.read().iter() {
            if *id == origin {
                continue;
            }
            let _ = tx.try_send(text.to_string());
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// True when no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

/// Gossip re-requests go to every connected peer.
impl RequestSink for PeerSet {
    fn request(&self, hash: &Hash) {
        self.broadcast(hash.as_str());
    }
}
