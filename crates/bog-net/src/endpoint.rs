//! Per-connection protocol handling.
//!
//! One [`Endpoint`] is shared by every connection. A hash-reference frame is
//! answered from local state when possible and otherwise turned into a
//! request back at the announcing peer plus a gossip entry. A raw frame is
//! stored, offered to the log, and fanned out to the other peers, with any
//! unreplicated dependencies requested immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bog_core::{digest, open, Hash, Keypair, MetaDoc, Payload};
use bog_gossip::Gossip;
use bog_log::LogManager;
use bog_store::ContentStore;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::peers::{PeerId, PeerSet};
use crate::NetError;

/// Per-hash direct-request cooldown, matching the gossip window.
pub const DEFAULT_REQUEST_COOLDOWN: Duration = Duration::from_secs(30);

/// Cooldown entries are pruned once the map grows past this.
const REQUESTED_PRUNE_LEN: usize = 1024;

/// The shared replication endpoint.
pub struct Endpoint {
    store: Arc<dyn ContentStore>,
    log: Arc<LogManager>,
    gossip: Arc<Gossip>,
    peers: Arc<PeerSet>,
    requested: Mutex<HashMap<Hash, Instant>>,
    cooldown: Duration,
}

impl Endpoint {
    /// Wires an endpoint over the node's shared state.
    pub fn new(
        store: Arc<dyn ContentStore>,
        log: Arc<LogManager>,
        gossip: Arc<Gossip>,
        peers: Arc<PeerSet>,
    ) -> Self {
        Self {
            store,
            log,
            gossip,
            peers,
            requested: Mutex::new(HashMap::new()),
            cooldown: DEFAULT_REQUEST_COOLDOWN,
        }
    }

    /// The connected peer set.
    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    /// The log manager.
    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }

    /// The gossip coordinator.
    pub fn gossip(&self) -> &Arc<Gossip> {
        &self.gossip
    }

    /// The content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Handles one inbound text frame from `origin`.
    pub fn handle_frame(&self, origin: PeerId, text: &str) {
        match Frame::classify(text) {
            Frame::HashRef(hash) => self.handle_hash_ref(origin, hash),
            Frame::Raw(text) => self.handle_raw(origin, &text),
        }
    }

    /// A hash reference doubles as a query: a pubkey gets the author's
    /// latest envelope, a content hash gets the blob. A hash we can answer
    /// neither way is assumed to be content the peer is announcing, so we
    /// ask them for it and track it as missing.
    fn handle_hash_ref(&self, origin: PeerId, hash: Hash) {
        let mut answered = false;

        if let Some(latest) = self.log.get_latest(hash.as_str()) {
            self.peers.send(origin, &latest.envelope);
            answered = true;
        }

        match self.store.get_text(hash.as_str()) {
            Ok(Some(blob)) => {
                self.peers.send(origin, &blob);
                self.gossip.resolve(&hash);
                answered = true;
            }
            Ok(None) => {}
            Err(e) => warn!(%hash, "failed to read blob for peer request: {e}"),
        }

        if !answered {
            debug!(%origin, %hash, "unknown hash announced, requesting");
            self.request_from(origin, &hash);
            self.gossip.enqueue(hash);
        }
    }

    /// Ingests a raw blob: store it, resolve gossip, offer it to the log,
    /// chase missing dependencies, and fan it out to the other peers unless
    /// it was already known.
    fn handle_raw(&self, origin: PeerId, text: &str) {
        let hash = digest(text.as_bytes());
        let was_present = matches!(self.store.get(hash.as_str()), Ok(Some(_)));

        if let Err(e) = self.store.put(hash.as_str(), text.as_bytes()) {
            warn!(%hash, "failed to store inbound blob: {e}");
            return;
        }
        self.gossip.resolve(&hash);

        let accepted = match self.log.add(text) {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(%hash, "log rejected inbound blob: {e}");
                false
            }
        };

        if accepted || !was_present {
            for dep in self.missing_deps(text) {
                self.request_from(origin, &dep);
                self.gossip.enqueue(dep);
            }
            self.peers.broadcast_except(origin, text);
        }
    }

    /// Publishes a message body as the local identity and pushes the content
    /// blob, the envelope, and its hash to every connected peer.
    pub fn publish(&self, body: &str, keypair: &Keypair) -> Result<Hash, NetError> {
        let envelope_hash = self.log.compose(body, keypair)?;

        if let Ok(Some(envelope)) = self.store.get_text(envelope_hash.as_str()) {
            let payload = open(&envelope).and_then(|opened| Payload::parse(&opened));
            if let Some(payload) = payload {
                if let Ok(Some(content)) = self.store.get_text(payload.content.as_str()) {
                    self.peers.broadcast(&content);
                }
            }
            self.peers.broadcast(&envelope);
        }
        self.peers.broadcast(envelope_hash.as_str());
        Ok(envelope_hash)
    }

    /// Walks the dependency graph under `text` across locally present blobs
    /// and returns the hashes that are not yet replicated.
    fn missing_deps(&self, text: &str) -> Vec<Hash> {
        let mut missing = Vec::new();
        let mut visited: HashSet<Hash> = HashSet::new();
        let mut stack: Vec<Hash> = Vec::new();
        direct_deps(text, &mut stack);

        while let Some(hash) = stack.pop() {
            if !visited.insert(hash.clone()) {
                continue;
            }
            match self.store.get_text(hash.as_str()) {
                Ok(Some(blob)) => direct_deps(&blob, &mut stack),
                Ok(None) => missing.push(hash),
                Err(e) => warn!(%hash, "failed to read blob during dependency walk: {e}"),
            }
        }
        missing
    }

    /// Sends a hash request directly to one peer, at most once per cooldown
    /// window per hash.
    fn request_from(&self, peer: PeerId, hash: &Hash) {
        let now = Instant::now();
        let mut requested = self.requested.lock();
        if requested
            .get(hash)
            .is_some_and(|at| now.duration_since(*at) < self.cooldown)
        {
            return;
        }
        if requested.len() > REQUESTED_PRUNE_LEN {
            requested.retain(|_, at| now.duration_since(*at) < self.cooldown);
        }
        requested.insert(hash.clone(), now);
        drop(requested);

        self.peers.send(peer, hash.as_str());
    }
}

/// Collects the immediate dependencies of one blob: an envelope depends on
/// its content hash, a content blob on its metadata references.
fn direct_deps(text: &str, out: &mut Vec<Hash>) {
    if let Some(payload) = open(text).and_then(|opened| Payload::parse(&opened)) {
        out.push(payload.content);
    } else {
        out.extend(MetaDoc::parse(text).dependencies());
    }
}
