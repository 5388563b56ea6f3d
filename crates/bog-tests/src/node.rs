//! Test node implementation for integration testing.

use std::sync::Arc;

use bog_core::{Hash, Keypair};
use bog_gossip::{Gossip, StoreProbe};
use bog_log::LogManager;
use bog_net::{Endpoint, NetError, PeerSet};
use bog_store::{ContentStore, MemoryStore};
use tracing::info;

/// A fully wired in-process node over an in-memory store.
pub struct TestNode {
    /// Local signing identity
    pub keypair: Keypair,
    /// The backing store, kept concrete for direct inspection
    pub store: Arc<MemoryStore>,
    /// The hash log
    pub log: Arc<LogManager>,
    /// Missing-content coordinator
    pub gossip: Arc<Gossip>,
    /// Connected peers
    pub peers: Arc<PeerSet>,
    /// The replication endpoint
    pub endpoint: Arc<Endpoint>,
}

impl TestNode {
    /// Creates a node with a fresh identity and empty state.
    pub fn new() -> Self {
        let keypair = Keypair::generate();
        let store = Arc::new(MemoryStore::new());
        let content: Arc<dyn ContentStore> = store.clone();

        let log = Arc::new(LogManager::new(content.clone()));
        let gossip = Arc::new(Gossip::new(Arc::new(StoreProbe(content.clone()))));
        let peers = Arc::new(PeerSet::new());
        let endpoint = Arc::new(Endpoint::new(
            content,
            log.clone(),
            gossip.clone(),
            peers.clone(),
        ));

        info!(pubkey = %keypair.pubkey(), "created test node");
        Self {
            keypair,
            store,
            log,
            gossip,
            peers,
            endpoint,
        }
    }

    /// Signs and publishes a message body, pushing it to connected peers.
    pub fn publish(&self, body: &str) -> Result<Hash, NetError> {
        self.endpoint.publish(body, &self.keypair)
    }

    /// The node's public key.
    pub fn pubkey(&self) -> String {
        self.keypair.pubkey()
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}
