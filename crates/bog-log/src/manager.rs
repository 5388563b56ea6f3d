//! The hash log manager.
//!
//! Single-writer discipline: every mutation of the hash log and opened log
//! happens under one internal mutex, so `add`, `rebuild`, and `purge_author`
//! never interleave partial writes. Readers take an `Arc` snapshot of the
//! opened log that is swapped atomically after each mutation and never block
//! a writer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bog_core::{author_of, digest, open, sign, Hash, Keypair, MetaDoc, Payload, HASH_LEN};
use bog_store::ContentStore;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::entry::LogEntry;
use crate::keys;
use crate::LogError;

/// Result of a cascading author purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Log entries removed.
    pub removed: usize,
    /// Blobs deleted from the store (envelopes and content).
    pub blobs: usize,
}

#[derive(Default)]
struct State {
    hash_log: Vec<Hash>,
    opened_log: Vec<LogEntry>,
}

/// Owns and mutates the authoritative log.
pub struct LogManager {
    store: Arc<dyn ContentStore>,
    state: Mutex<State>,
    snapshot: RwLock<Arc<Vec<LogEntry>>>,
    /// Persisted state is stale.
    dirty: AtomicBool,
    /// The log needs an integrity/re-sort pass. Starts set so the first
    /// rebuild after a restart verifies whatever was loaded.
    needs_rebuild: AtomicBool,
    accepted_tx: broadcast::Sender<Hash>,
}

impl LogManager {
    /// Creates a manager over the given store with empty in-memory logs.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        let (accepted_tx, _) = broadcast::channel(64);
        Self {
            store,
            state: Mutex::new(State::default()),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            dirty: AtomicBool::new(false),
            needs_rebuild: AtomicBool::new(true),
            accepted_tx,
        }
    }

    /// Restores both logs from their persisted store keys.
    pub fn load(&self) -> Result<(), LogError> {
        let mut state = self.state.lock();
        if let Some(text) = self.store.get_text(keys::HASHLOG)? {
            state.hash_log = serde_json::from_str(&text)?;
        }
        if let Some(text) = self.store.get_text(keys::OPENEDLOG)? {
            state.opened_log = serde_json::from_str(&text)?;
        }
        debug!(entries = state.hash_log.len(), "loaded persisted log");
        self.refresh_snapshot(&state);
        self.needs_rebuild.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Subscribes to accepted-envelope events: the hash of every envelope
    /// that `add` accepts. Fire-and-forget; lagging subscribers miss events.
    pub fn subscribe_accepted(&self) -> broadcast::Receiver<Hash> {
        self.accepted_tx.subscribe()
    }

    /// Verifies and appends an envelope.
    ///
    /// Returns `Ok(false)` with no mutation when the envelope does not open,
    /// its payload is malformed, or its hash is already in the log.
    pub fn add(&self, envelope: &str) -> Result<bool, LogError> {
        let Some(opened) = open(envelope) else {
            return Ok(false);
        };
        let Some(payload) = Payload::parse(&opened) else {
            return Ok(false);
        };
        let Some(author) = author_of(envelope) else {
            return Ok(false);
        };
        let hash = digest(envelope.as_bytes());

        let mut state = self.state.lock();
        if state.hash_log.contains(&hash) {
            return Ok(false);
        }

        self.store.put(hash.as_str(), envelope.as_bytes())?;
        // Content may not have replicated yet; tolerate absence.
        let text = self.store.get_text(payload.content.as_str())?;

        let entry = LogEntry {
            hash: hash.clone(),
            envelope: envelope.to_string(),
            author: author.to_string(),
            opened,
            text,
            ts: payload.ts.to_text(),
        };
        state.hash_log.push(hash.clone());
        state.opened_log.push(entry);
        self.refresh_snapshot(&state);

        self.dirty.store(true, Ordering::SeqCst);
        self.needs_rebuild.store(true, Ordering::SeqCst);
        let _ = self.accepted_tx.send(hash);
        Ok(true)
    }

    /// The self-healing pass: re-derives the opened log from the store,
    /// evicting corrupt or unopenable entries, then re-sorts ascending by
    /// timestamp and swaps both logs atomically.
    ///
    /// Runs work only when a mutation marked the log since the last pass.
    pub fn rebuild(&self) -> Result<(), LogError> {
        if !self.needs_rebuild.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut state = self.state.lock();
        let mut entries: Vec<LogEntry> = Vec::with_capacity(state.hash_log.len());

        for hash in &state.hash_log {
            let envelope = match self.store.get_text(hash.as_str()) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    debug!(%hash, "rebuild: envelope blob missing, dropping");
                    continue;
                }
                Err(e) => {
                    // Abort without mutating; retry on the next pass.
                    self.needs_rebuild.store(true, Ordering::SeqCst);
                    return Err(e.into());
                }
            };

            if digest(envelope.as_bytes()) != *hash {
                warn!(%hash, "rebuild: envelope digest mismatch, purging");
                let _ = self.store.remove(hash.as_str());
                continue;
            }

            let payload = open(&envelope).and_then(|opened| {
                Payload::parse(&opened).map(|payload| (opened, payload))
            });
            let (Some((opened, payload)), Some(author)) = (payload, author_of(&envelope)) else {
                warn!(%hash, "rebuild: envelope failed to open, purging");
                let _ = self.store.remove(hash.as_str());
                continue;
            };

            let content = match self.store.get_text(payload.content.as_str()) {
                Ok(content) => content,
                Err(e) => {
                    self.needs_rebuild.store(true, Ordering::SeqCst);
                    return Err(e.into());
                }
            };
            let mut text = None;
            if let Some(content) = content {
                if digest(content.as_bytes()) != payload.content {
                    warn!(%hash, "rebuild: content digest mismatch, purging content");
                    let _ = self.store.remove(payload.content.as_str());
                    continue;
                }
                text = Some(content);
            }

            entries.push(LogEntry {
                hash: hash.clone(),
                author: author.to_string(),
                envelope,
                opened,
                text,
                ts: payload.ts.to_text(),
            });
        }

        entries.sort_by_key(LogEntry::ts_millis);
        state.hash_log = entries.iter().map(|e| e.hash.clone()).collect();
        state.opened_log = entries;
        self.refresh_snapshot(&state);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Removes every entry by `author` from both logs and deletes their
    /// envelope blobs plus the content blobs they reference, unless a
    /// surviving entry still references the same content.
    ///
    /// A no-op unless `author` is 44 characters and has entries.
    pub fn purge_author(&self, author: &str) -> PurgeStats {
        if author.len() != HASH_LEN {
            return PurgeStats::default();
        }

        let mut state = self.state.lock();
        if !state.opened_log.iter().any(|e| e.author == author) {
            return PurgeStats::default();
        }

        let log = std::mem::take(&mut state.opened_log);
        let (purged, kept): (Vec<LogEntry>, Vec<LogEntry>) =
            log.into_iter().partition(|e| e.author == author);

        // Content still referenced by survivors must not be deleted.
        let mut referenced: HashSet<Hash> = HashSet::new();
        for entry in &kept {
            referenced.extend(entry.content_hash());
            if let Some(text) = &entry.text {
                referenced.extend(MetaDoc::parse(text).dependencies());
            }
        }

        let mut candidates: HashSet<Hash> = HashSet::new();
        for entry in &purged {
            candidates.extend(entry.content_hash());
            if let Some(text) = &entry.text {
                candidates.extend(MetaDoc::parse(text).dependencies());
            }
        }

        let mut stats = PurgeStats {
            removed: purged.len(),
            blobs: 0,
        };

        // Blob deletion is best-effort: a store failure is logged and the
        // remaining deletions continue.
        for entry in &purged {
            match self.remove_if_present(entry.hash.as_str()) {
                Ok(true) => stats.blobs += 1,
                Ok(false) => {}
                Err(e) => warn!(hash = %entry.hash, "purge: failed to remove envelope: {e}"),
            }
        }
        for hash in candidates.difference(&referenced) {
            match self.remove_if_present(hash.as_str()) {
                Ok(true) => stats.blobs += 1,
                Ok(false) => {}
                Err(e) => warn!(%hash, "purge: failed to remove content: {e}"),
            }
        }

        state.hash_log = kept.iter().map(|e| e.hash.clone()).collect();
        state.opened_log = kept;
        self.refresh_snapshot(&state);
        self.dirty.store(true, Ordering::SeqCst);

        debug!(author, removed = stats.removed, blobs = stats.blobs, "purged author");
        stats
    }

    fn remove_if_present(&self, key: &str) -> Result<bool, LogError> {
        if self.store.get(key)?.is_none() {
            return Ok(false);
        }
        self.store.remove(key)?;
        Ok(true)
    }

    /// Queries the opened log.
    ///
    /// No filter returns the full log. A filter starting with `?` is a
    /// case-insensitive body text search (with `%20` decoded to spaces, the
    /// directory's URL form). Anything else matches author or hash exactly.
    pub fn query(&self, filter: Option<&str>) -> Vec<LogEntry> {
        let snap = self.entries();
        match filter {
            None => (*snap).clone(),
            Some(q) if q.starts_with('?') => {
                let search = q[1..].replace("%20", " ").to_uppercase();
                snap.iter()
                    .filter(|e| {
                        e.text
                            .as_ref()
                            .is_some_and(|t| t.to_uppercase().contains(&search))
                    })
                    .cloned()
                    .collect()
            }
            Some(q) => snap
                .iter()
                .filter(|e| e.author == q || e.hash.as_str() == q)
                .cloned()
                .collect(),
        }
    }

    /// The most recent entry by an author: last in sorted order.
    pub fn get_latest(&self, author: &str) -> Option<LogEntry> {
        self.entries().iter().rev().find(|e| e.author == author).cloned()
    }

    /// Every distinct author in the log, in first-seen order.
    pub fn pubkeys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries()
            .iter()
            .filter(|e| seen.insert(e.author.clone()))
            .map(|e| e.author.clone())
            .collect()
    }

    /// A consistent point-in-time snapshot of the opened log.
    pub fn entries(&self) -> Arc<Vec<LogEntry>> {
        self.snapshot.read().clone()
    }

    /// The current ordered envelope hashes.
    pub fn hash_log(&self) -> Vec<Hash> {
        self.state.lock().hash_log.clone()
    }

    /// Persists both logs if anything changed since the last flush. Many
    /// mutations between flushes coalesce into one write per log.
    pub fn flush_if_dirty(&self) -> Result<bool, LogError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        let (hashlog, openedlog) = {
            let state = self.state.lock();
            (
                serde_json::to_string(&state.hash_log)?,
                serde_json::to_string(&state.opened_log)?,
            )
        };
        let result = self
            .store
            .put(keys::HASHLOG, hashlog.as_bytes())
            .and_then(|()| self.store.put(keys::OPENEDLOG, openedlog.as_bytes()));
        if let Err(e) = result {
            // Keep the dirty flag so the next tick retries.
            self.dirty.store(true, Ordering::SeqCst);
            warn!("log flush failed: {e}");
            return Err(e.into());
        }
        Ok(true)
    }

    /// Composes, stores, and signs a message body as the local identity.
    ///
    /// Wraps the body with `name`/`image`/`previous` front-matter when any of
    /// those profile keys is set, appends the signed envelope to the log, and
    /// advances the advisory `previous` chain link. Returns the envelope
    /// hash.
    pub fn compose(&self, body: &str, keypair: &Keypair) -> Result<Hash, LogError> {
        let doc = MetaDoc {
            name: self.store.get_text(keys::NAME)?,
            image: self
                .store
                .get_text(keys::IMAGE)?
                .and_then(|s| Hash::parse(&s)),
            previous: self
                .store
                .get_text(keys::PREVIOUS)?
                .and_then(|s| Hash::parse(&s)),
            body: body.to_string(),
        };
        let content = doc.compose();
        let content_hash = digest(content.as_bytes());
        self.store.put(content_hash.as_str(), content.as_bytes())?;

        let envelope = sign(&content_hash, keypair);
        self.add(&envelope)?;

        let envelope_hash = digest(envelope.as_bytes());
        self.store
            .put(keys::PREVIOUS, envelope_hash.as_str().as_bytes())?;
        Ok(envelope_hash)
    }

    fn refresh_snapshot(&self, state: &State) {
        *self.snapshot.write() = Arc::new(state.opened_log.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bog_core::{sign_at, Timestamp};
    use bog_store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, LogManager) {
        let store = Arc::new(MemoryStore::new());
        let log = LogManager::new(store.clone() as Arc<dyn ContentStore>);
        (store, log)
    }

    fn publish(log: &LogManager, store: &MemoryStore, kp: &Keypair, body: &str, ts: i64) -> Hash {
        let content_hash = digest(body.as_bytes());
        store.put(content_hash.as_str(), body.as_bytes()).unwrap();
        let envelope = sign_at(&content_hash, kp, Timestamp::new(ts));
        assert!(log.add(&envelope).unwrap());
        digest(envelope.as_bytes())
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_store, log) = manager();
        let kp = Keypair::generate();
        let envelope = sign_at(&digest(b"hi"), &kp, Timestamp::new(1700000000000));

        assert!(log.add(&envelope).unwrap());
        assert!(!log.add(&envelope).unwrap());
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.hash_log().len(), 1);
    }

    #[test]
    fn test_add_rejects_garbage() {
        let (_store, log) = manager();
        assert!(!log.add("").unwrap());
        assert!(!log.add("not an envelope at all").unwrap());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_add_emits_accepted_event() {
        let (_store, log) = manager();
        let mut events = log.subscribe_accepted();

        let kp = Keypair::generate();
        let envelope = sign_at(&digest(b"hi"), &kp, Timestamp::new(1700000000000));
        log.add(&envelope).unwrap();

        assert_eq!(events.try_recv().unwrap(), digest(envelope.as_bytes()));
    }

    #[test]
    fn test_rebuild_sorts_by_timestamp() {
        let (store, log) = manager();
        let kp = Keypair::generate();

        publish(&log, &store, &kp, "third", 1700000000300);
        publish(&log, &store, &kp, "first", 1700000000100);
        publish(&log, &store, &kp, "second", 1700000000200);

        log.rebuild().unwrap();

        let bodies: Vec<_> = log
            .entries()
            .iter()
            .map(|e| e.text.clone().unwrap())
            .collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);

        let hashes = log.hash_log();
        let entries = log.entries();
        assert_eq!(hashes.len(), entries.len());
        for (hash, entry) in hashes.iter().zip(entries.iter()) {
            assert_eq!(*hash, entry.hash);
        }
    }

    #[test]
    fn test_rebuild_resolves_late_content() {
        let (store, log) = manager();
        let kp = Keypair::generate();

        // Envelope arrives before its content.
        let content_hash = digest(b"late");
        let envelope = sign_at(&content_hash, &kp, Timestamp::new(1700000000000));
        log.add(&envelope).unwrap();
        assert!(log.entries()[0].text.is_none());

        store.put(content_hash.as_str(), b"late").unwrap();
        log.rebuild().unwrap();
        assert_eq!(log.entries()[0].text.as_deref(), Some("late"));
    }

    #[test]
    fn test_rebuild_purges_corrupted_envelope() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        let hash = publish(&log, &store, &kp, "will corrupt", 1700000000000);
        publish(&log, &store, &kp, "stays", 1700000000100);

        // Corrupt the stored envelope bytes out from under the log.
        store.put(hash.as_str(), b"corrupted bytes").unwrap();

        log.rebuild().unwrap();
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].text.as_deref(), Some("stays"));
        // The corrupt blob was purged.
        assert!(store.get(hash.as_str()).unwrap().is_none());
    }

    #[test]
    fn test_rebuild_purges_mismatched_content() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        let content_hash = digest(b"original");
        store.put(content_hash.as_str(), b"original").unwrap();
        let envelope = sign_at(&content_hash, &kp, Timestamp::new(1700000000000));
        log.add(&envelope).unwrap();

        // Tamper with the content blob.
        store.put(content_hash.as_str(), b"tampered").unwrap();

        log.rebuild().unwrap();
        assert!(log.entries().is_empty());
        assert!(store.get(content_hash.as_str()).unwrap().is_none());
    }

    #[test]
    fn test_rebuild_drops_missing_envelope() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        let hash = publish(&log, &store, &kp, "vanishes", 1700000000000);

        store.remove(hash.as_str()).unwrap();
        log.rebuild().unwrap();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_rebuild_skips_when_clean() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        let hash = publish(&log, &store, &kp, "msg", 1700000000000);
        log.rebuild().unwrap();

        // Corruption after a clean pass goes unnoticed until the next add.
        store.put(hash.as_str(), b"corrupt").unwrap();
        log.rebuild().unwrap();
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_purge_author() {
        let (store, log) = manager();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let a1 = publish(&log, &store, &alice, "alice one", 1700000000000);
        publish(&log, &store, &alice, "alice two", 1700000000100);
        publish(&log, &store, &bob, "bob stays", 1700000000200);

        let stats = log.purge_author(&alice.pubkey());
        assert_eq!(stats.removed, 2);
        // Two envelope blobs and two content blobs.
        assert_eq!(stats.blobs, 4);

        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].author, bob.pubkey());
        assert!(store.get(a1.as_str()).unwrap().is_none());
        assert!(store.get(digest(b"alice one").as_str()).unwrap().is_none());
        assert!(store.get(digest(b"bob stays").as_str()).unwrap().is_some());
    }

    #[test]
    fn test_purge_author_keeps_shared_content() {
        let (store, log) = manager();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        // Both authors sign the same content blob.
        let body = "shared";
        publish(&log, &store, &alice, body, 1700000000000);
        let content_hash = digest(body.as_bytes());
        let envelope = sign_at(&content_hash, &bob, Timestamp::new(1700000000100));
        log.add(&envelope).unwrap();
        log.rebuild().unwrap();

        log.purge_author(&alice.pubkey());
        assert!(store.get(content_hash.as_str()).unwrap().is_some());
    }

    #[test]
    fn test_purge_unknown_author_is_noop() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        publish(&log, &store, &kp, "msg", 1700000000000);

        let stranger = Keypair::generate();
        assert_eq!(log.purge_author(&stranger.pubkey()), PurgeStats::default());
        assert_eq!(log.purge_author("not a pubkey"), PurgeStats::default());
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_query_modes() {
        let (store, log) = manager();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let a1 = publish(&log, &store, &alice, "Hello World", 1700000000000);
        publish(&log, &store, &bob, "goodbye", 1700000000100);

        assert_eq!(log.query(None).len(), 2);
        assert_eq!(log.query(Some(&alice.pubkey())).len(), 1);
        assert_eq!(log.query(Some(a1.as_str())).len(), 1);
        assert_eq!(log.query(Some("?hello%20world")).len(), 1);
        assert_eq!(log.query(Some("?GOODBYE")).len(), 1);
        assert!(log.query(Some("?missing")).is_empty());
        assert!(log.query(Some("nobody")).is_empty());
    }

    #[test]
    fn test_get_latest() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        publish(&log, &store, &kp, "old", 1700000000000);
        publish(&log, &store, &kp, "new", 1700000000100);
        log.rebuild().unwrap();

        let latest = log.get_latest(&kp.pubkey()).unwrap();
        assert_eq!(latest.text.as_deref(), Some("new"));
        assert!(log.get_latest("nobody").is_none());
    }

    #[test]
    fn test_flush_and_load_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let kp = Keypair::generate();
        {
            let log = LogManager::new(store.clone() as Arc<dyn ContentStore>);
            publish(&log, &store, &kp, "persisted", 1700000000000);
            assert!(log.flush_if_dirty().unwrap());
            // A second flush with no changes writes nothing.
            assert!(!log.flush_if_dirty().unwrap());
        }

        let log = LogManager::new(store.clone() as Arc<dyn ContentStore>);
        log.load().unwrap();
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].text.as_deref(), Some("persisted"));
        assert_eq!(log.hash_log().len(), 1);
    }

    #[test]
    fn test_compose_chains_previous() {
        let (store, log) = manager();
        let kp = Keypair::generate();

        let first = log.compose("first post", &kp).unwrap();
        assert_eq!(
            store.get(keys::PREVIOUS).unwrap().unwrap(),
            first.as_str().as_bytes()
        );

        log.compose("second post", &kp).unwrap();
        log.rebuild().unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        // First post had no profile state: bare body.
        let doc = MetaDoc::parse(entries[0].text.as_ref().unwrap());
        assert_eq!(doc.body, "first post");
        assert!(doc.previous.is_none());
        // Second post links back to the first envelope.
        let doc = MetaDoc::parse(entries[1].text.as_ref().unwrap());
        assert_eq!(doc.body, "second post");
        assert_eq!(doc.previous, Some(first));
    }

    #[test]
    fn test_compose_includes_profile() {
        let (store, log) = manager();
        let kp = Keypair::generate();
        store.put(keys::NAME, b"ada").unwrap();

        log.compose("hello", &kp).unwrap();
        let doc = MetaDoc::parse(log.entries()[0].text.as_ref().unwrap());
        assert_eq!(doc.name.as_deref(), Some("ada"));
        assert_eq!(doc.body, "hello");
    }

    #[test]
    fn test_pubkeys() {
        let (store, log) = manager();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        publish(&log, &store, &alice, "one", 1700000000000);
        publish(&log, &store, &bob, "two", 1700000000100);
        publish(&log, &store, &alice, "three", 1700000000200);

        assert_eq!(log.pubkeys(), vec![alice.pubkey(), bob.pubkey()]);
    }
}
