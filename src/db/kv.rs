use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::models::{KvKey, KvRecord};
use super::stores::KvBackend;
use super::DatabaseError;

/// Per-collection persistence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    /// Minimum time between two backend flushes of the collection.
    pub flush_interval: Duration,
    /// Lifetime of an entry, counted from its last write.
    pub ttl: Option<Duration>,
}

impl CollectionPolicy {
    pub const fn new(flush_interval: Duration, ttl: Option<Duration>) -> Self {
        Self {
            flush_interval,
            ttl,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Upsert(Entry),
    Delete,
}

struct CollectionState {
    policy: CollectionPolicy,
    entries: HashMap<String, Entry>,
    pending: HashMap<String, PendingWrite>,
    last_flush: Instant,
}

impl CollectionState {
    fn new(policy: CollectionPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            pending: HashMap::new(),
            last_flush: Instant::now(),
        }
    }
}

/// Memory-first key/value store. Every read is answered from memory, writes
/// are queued and pushed to the backend by [`KvStore::flush`].
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    collections: Mutex<HashMap<String, CollectionState>>,
}

impl KvStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, collection: &str, policy: CollectionPolicy) {
        self.collections
            .lock()
            .entry(collection.to_string())
            .and_modify(|state| state.policy = policy)
            .or_insert_with(|| CollectionState::new(policy));
    }

    /// Hydrates registered collections from the backend, skipping entries
    /// that expired while the process was down.
    pub async fn load(&self) -> Result<usize, DatabaseError> {
        let records = self.backend.load_all().await?;
        let now = Utc::now();
        let mut loaded = 0;
        let mut collections = self.collections.lock();
        for record in records {
            let Some(state) = collections.get_mut(&record.collection) else {
                continue;
            };
            let entry = Entry {
                value: record.value,
                expires_at: record.expires_at,
            };
            if entry.is_expired(now) {
                continue;
            }
            state.entries.insert(record.key, entry);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<String> {
        let now = Utc::now();
        let mut collections = self.collections.lock();
        let state = collections.get_mut(collection)?;
        match state.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                state.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, collection: &str, key: &str, value: String) {
        let mut collections = self.collections.lock();
        let state = collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionState::new(CollectionPolicy::new(Duration::ZERO, None)));
        let expires_at = state
            .policy
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        let entry = Entry { value, expires_at };
        state.entries.insert(key.to_string(), entry.clone());
        state
            .pending
            .insert(key.to_string(), PendingWrite::Upsert(entry));
    }

    /// Reads and deletes in one step, so only one caller ever observes the value.
    pub fn take(&self, collection: &str, key: &str) -> Option<String> {
        let now = Utc::now();
        let mut collections = self.collections.lock();
        let state = collections.get_mut(collection)?;
        let entry = state.entries.remove(key)?;
        state.pending.insert(key.to_string(), PendingWrite::Delete);
        if entry.is_expired(now) {
            None
        } else {
            Some(entry.value)
        }
    }

    #[cfg(test)]
    pub fn pending_writes(&self) -> usize {
        self.collections
            .lock()
            .values()
            .map(|state| state.pending.len())
            .sum()
    }

    /// Pushes queued writes of every collection whose flush interval elapsed,
    /// or of all collections when `force` is set. Backend failures are logged
    /// and the writes stay queued for the next call unless rewritten since.
    pub async fn flush(&self, force: bool) -> usize {
        let now = Instant::now();
        let mut drained: Vec<(String, HashMap<String, PendingWrite>)> = Vec::new();
        {
            let mut collections = self.collections.lock();
            for (name, state) in collections.iter_mut() {
                if state.pending.is_empty() {
                    continue;
                }
                if !force && now.duration_since(state.last_flush) < state.policy.flush_interval {
                    continue;
                }
                state.last_flush = now;
                drained.push((name.clone(), std::mem::take(&mut state.pending)));
            }
        }

        let mut written = 0;
        for (collection, writes) in drained {
            let mut upserts = Vec::new();
            let mut deletes = Vec::new();
            for (key, write) in &writes {
                match write {
                    PendingWrite::Upsert(entry) => upserts.push(KvRecord {
                        collection: collection.clone(),
                        key: key.clone(),
                        value: entry.value.clone(),
                        expires_at: entry.expires_at,
                    }),
                    PendingWrite::Delete => deletes.push(KvKey {
                        collection: collection.clone(),
                        key: key.clone(),
                    }),
                }
            }

            match self.backend.apply(&upserts, &deletes).await {
                Ok(()) => {
                    written += writes.len();
                    debug!(
                        collection = %collection,
                        upserts = upserts.len(),
                        deletes = deletes.len(),
                        "Flushed collection"
                    );
                }
                Err(err) => {
                    warn!(
                        collection = %collection,
                        pending = writes.len(),
                        "Failed to flush collection, will retry: {err}"
                    );
                    let mut collections = self.collections.lock();
                    if let Some(state) = collections.get_mut(&collection) {
                        for (key, write) in writes {
                            state.pending.entry(key).or_insert(write);
                        }
                    }
                }
            }
        }
        written
    }

    /// Drops expired entries from memory and from the backend.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        {
            let mut collections = self.collections.lock();
            for state in collections.values_mut() {
                let before = state.entries.len();
                state.entries.retain(|_, entry| !entry.is_expired(now));
                purged += before - state.entries.len();
            }
        }
        if let Err(err) = self.backend.purge_expired(now).await {
            warn!("Failed to purge expired entries: {err}");
        }
        purged
    }

    pub fn spawn_flusher(self: Arc<Self>, tick: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.flush(false).await;
                self.purge_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{CollectionPolicy, KvStore};
    use crate::db::stores::{KvBackend, MemoryKvBackend};

    fn store_with(backend: Arc<MemoryKvBackend>) -> KvStore {
        let store = KvStore::new(backend);
        store.register("links", CollectionPolicy::new(Duration::from_secs(30), None));
        store.register("nonces", CollectionPolicy::new(Duration::ZERO, Some(Duration::ZERO)));
        store
    }

    #[tokio::test]
    async fn reads_see_latest_write_before_flush() {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = store_with(backend.clone());

        store.set("links", "1", "a".to_string());
        store.set("links", "1", "b".to_string());

        assert_eq!(store.get("links", "1").as_deref(), Some("b"));
        assert!(backend.is_empty());
        assert_eq!(store.pending_writes(), 1);
    }

    #[tokio::test]
    async fn coalesced_collection_waits_for_interval_unless_forced() {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = store_with(backend.clone());

        store.set("links", "1", "a".to_string());
        assert_eq!(store.flush(false).await, 0);
        assert!(backend.is_empty());

        assert_eq!(store.flush(true).await, 1);
        assert_eq!(backend.get("links", "1").map(|r| r.value).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn failed_flush_is_retried_without_clobbering_newer_writes() {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = store_with(backend.clone());

        store.set("links", "1", "old".to_string());
        store.set("links", "2", "kept".to_string());
        backend.set_failing(true);
        assert_eq!(store.flush(true).await, 0);
        assert_eq!(store.pending_writes(), 2);

        store.set("links", "1", "new".to_string());
        backend.set_failing(false);
        assert_eq!(store.flush(true).await, 2);
        assert_eq!(backend.get("links", "1").map(|r| r.value).as_deref(), Some("new"));
        assert_eq!(backend.get("links", "2").map(|r| r.value).as_deref(), Some("kept"));
        assert_eq!(store.pending_writes(), 0);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = store_with(backend.clone());

        store.set("nonces", "n", "v".to_string());
        assert!(store.get("nonces", "n").is_none());
        assert!(store.take("nonces", "n").is_none());
    }

    #[tokio::test]
    async fn take_is_single_use_and_propagates_delete() {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = store_with(backend.clone());

        store.set("links", "k", "v".to_string());
        store.flush(true).await;
        assert_eq!(store.take("links", "k").as_deref(), Some("v"));
        assert!(store.take("links", "k").is_none());

        store.flush(true).await;
        assert!(backend.get("links", "k").is_none());
    }

    #[tokio::test]
    async fn load_hydrates_only_live_entries() {
        let backend = Arc::new(MemoryKvBackend::new());
        {
            let store = store_with(backend.clone());
            store.set("links", "1", "persisted".to_string());
            store.set("nonces", "n", "gone".to_string());
            store.flush(true).await;
        }
        assert_eq!(backend.load_all().await.unwrap().len(), 2);

        let reopened = store_with(backend.clone());
        assert_eq!(reopened.load().await.unwrap(), 1);
        assert_eq!(reopened.get("links", "1").as_deref(), Some("persisted"));

        reopened.purge_expired().await;
        assert_eq!(backend.len(), 1);
    }
}
