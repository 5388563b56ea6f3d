//! Bog Gossip - Tracks content known to be missing locally and re-requests
//! it from connected peers with bounded pressure.
//!
//! Detection ("this hash is referenced but we don't have it") and requesting
//! ("ask the peers for it") run on independent schedules: references
//! discovered in a burst land in the missing set immediately, while the
//! periodic tick re-requests them at most once per cooldown window. Absence
//! of a reply is indistinguishable from "still missing" and is simply
//! retried on a later tick.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bog_core::Hash;
use bog_store::ContentStore;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// Default tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-hash request cooldown.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Answers whether a hash is locally resolvable.
pub trait ContentProbe: Send + Sync {
    /// Returns true if the content behind `hash` is present locally.
    fn has(&self, hash: &Hash) -> bool;
}

/// A [`ContentProbe`] over a content store.
pub struct StoreProbe(pub Arc<dyn ContentStore>);

impl ContentProbe for StoreProbe {
    fn has(&self, hash: &Hash) -> bool {
        matches!(self.0.get(hash.as_str()), Ok(Some(_)))
    }
}

/// Sends a hash-reference request to every connected peer, best-effort.
pub trait RequestSink: Send + Sync {
    /// Fire-and-forget fan-out; a failure toward one peer must not abort
    /// the others.
    fn request(&self, hash: &Hash);
}

struct GossipEntry {
    last_requested_at: Option<Instant>,
}

/// The missing-hash index.
pub struct Gossip {
    probe: Arc<dyn ContentProbe>,
    missing: Mutex<HashMap<Hash, GossipEntry>>,
    cooldown: Duration,
}

impl Gossip {
    /// Creates a coordinator with the default cooldown.
    pub fn new(probe: Arc<dyn ContentProbe>) -> Self {
        Self::with_cooldown(probe, DEFAULT_COOLDOWN)
    }

    /// Creates a coordinator with an explicit cooldown window.
    pub fn with_cooldown(probe: Arc<dyn ContentProbe>, cooldown: Duration) -> Self {
        Self {
            probe,
            missing: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    /// Registers a hash as missing, unless it is already resolvable locally.
    pub fn enqueue(&self, hash: Hash) {
        if self.probe.has(&hash) {
            return;
        }
        self.missing
            .lock()
            .entry(hash)
            .or_insert(GossipEntry {
                last_requested_at: None,
            });
    }

    /// Drops a hash from the missing set. Called whenever content arrives.
    pub fn resolve(&self, hash: &Hash) {
        self.missing.lock().remove(hash);
    }

    /// One gossip cycle: re-check local resolvability for every missing
    /// hash, then re-request the rest, each at most once per cooldown
    /// window.
    pub fn tick(&self, out: &dyn RequestSink) {
        let mut missing = self.missing.lock();
        missing.retain(|hash, _| !self.probe.has(hash));

        let now = Instant::now();
        for (hash, entry) in missing.iter_mut() {
            if entry
                .last_requested_at
                .is_some_and(|at| now.duration_since(at) < self.cooldown)
            {
                continue;
            }
            debug!(%hash, "requesting missing content from peers");
            out.request(hash);
            entry.last_requested_at = Some(now);
        }
    }

    /// Number of hashes currently believed missing.
    pub fn missing_len(&self) -> usize {
        self.missing.lock().len()
    }

    /// Returns true if the hash is currently tracked as missing.
    pub fn is_missing(&self, hash: &Hash) -> bool {
        self.missing.lock().contains_key(hash)
    }
}

/// Spawns the periodic gossip tick on its own timer, independent of the log
/// manager's timers.
pub fn spawn_tick(
    gossip: Arc<Gossip>,
    out: Arc<dyn RequestSink>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        loop {
            timer.tick().await;
            gossip.tick(out.as_ref());
        }
    })
}
