//! Player data cache
//!
//! In-memory source of truth for every identity that is currently in use.
//!
//! - Loads are coalesced: concurrent `get_or_create` calls for the same id
//!   share one store read.
//! - Saves are fire-and-forget. They go through an unbounded queue to a writer
//!   task, which persists records on a bounded pool of store workers.
//! - Each commit bumps a per-record version. A write only lands if its snapshot
//!   is newer than the last persisted one, so per-identity writes stay ordered
//!   regardless of which worker runs them.

use crate::config::CacheConfig;
use crate::record::{CustomizationRecord, Identity};
use crate::store::CustomizationStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, MutexGuard, Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Proof that the holder owns a record's edit lock
pub type EditGuard<'a> = MutexGuard<'a, ()>;

type LoadFuture = Shared<BoxFuture<'static, Arc<RecordHandle>>>;

fn read<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Persistence state of a cached record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    LoadedClean,
    LoadedDirty,
}

struct Committed {
    record: Arc<CustomizationRecord>,
    version: u64,
}

/// The single live copy of one identity's record
pub struct RecordHandle {
    id: Uuid,
    committed: std::sync::RwLock<Committed>,
    persisted: AtomicU64,
    edit: Mutex<()>,
    persist: Mutex<()>,
    last_accessed: std::sync::RwLock<Instant>,
    active: AtomicBool,
    evicted: AtomicBool,
    fallback: bool,
}

impl RecordHandle {
    fn new(record: CustomizationRecord, fallback: bool) -> Self {
        Self {
            id: record.id,
            committed: std::sync::RwLock::new(Committed {
                record: Arc::new(record),
                version: 0,
            }),
            persisted: AtomicU64::new(0),
            edit: Mutex::new(()),
            persist: Mutex::new(()),
            last_accessed: std::sync::RwLock::new(Instant::now()),
            active: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            fallback,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest committed record
    pub fn snapshot(&self) -> Arc<CustomizationRecord> {
        read(&self.committed).record.clone()
    }

    /// Number of commits since the record was loaded
    pub fn version(&self) -> u64 {
        read(&self.committed).version
    }

    /// Commits not yet persisted. Always false for a fallback record.
    pub fn is_dirty(&self) -> bool {
        !self.fallback && self.version() > self.persisted.load(Ordering::SeqCst)
    }

    /// Empty stand-in created after a failed store load. It is never
    /// persisted, and the next `get_or_create` retries the load.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn state(&self) -> RecordState {
        if self.is_dirty() {
            RecordState::LoadedDirty
        } else {
            RecordState::LoadedClean
        }
    }

    /// Serialize mutations of this record
    pub async fn lock_edits(&self) -> EditGuard<'_> {
        self.edit.lock().await
    }

    /// Apply a mutation and bump the version
    pub fn commit<F>(&self, _guard: &EditGuard<'_>, apply: F) -> Arc<CustomizationRecord>
    where
        F: FnOnce(&mut CustomizationRecord),
    {
        let mut committed = write(&self.committed);
        let mut record = (*committed.record).clone();
        apply(&mut record);
        record.touch();
        committed.record = Arc::new(record);
        committed.version += 1;
        self.touch();
        committed.record.clone()
    }

    /// Whether the owning identity is currently connected
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Removed from the cache; holders must fetch the record again
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub fn idle_for(&self) -> Duration {
        read(&self.last_accessed).elapsed()
    }

    fn touch(&self) {
        *write(&self.last_accessed) = Instant::now();
    }

    fn committed(&self) -> (Arc<CustomizationRecord>, u64) {
        let committed = read(&self.committed);
        (committed.record.clone(), committed.version)
    }

    fn mark_persisted(&self, version: u64) {
        self.persisted.fetch_max(version, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordHandle")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("state", &self.state())
            .field("active", &self.is_active())
            .finish()
    }
}

struct CacheInner {
    store: Arc<dyn CustomizationStore>,
    config: std::sync::RwLock<CacheConfig>,
    records: DashMap<Uuid, Arc<RecordHandle>>,
    in_flight: DashMap<Uuid, LoadFuture>,
    workers: Arc<Semaphore>,
    queue: mpsc::UnboundedSender<Arc<RecordHandle>>,
    pending: AtomicUsize,
    drained: Notify,
    loads: AtomicU64,
}

/// Identity-keyed record cache in front of a [`CustomizationStore`]
pub struct PlayerDataCache {
    inner: Arc<CacheInner>,
}

impl PlayerDataCache {
    /// Create the cache and start its writer task. Must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn CustomizationStore>, config: CacheConfig) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(CacheInner {
            store,
            workers: Arc::new(Semaphore::new(config.io_workers.max(1))),
            config: std::sync::RwLock::new(config),
            records: DashMap::new(),
            in_flight: DashMap::new(),
            queue,
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            loads: AtomicU64::new(0),
        });

        tokio::spawn(run_writer(Arc::downgrade(&inner), rx));

        Self { inner }
    }

    /// Cached record, or a coalesced load from the store
    pub async fn get_or_create(&self, id: Uuid) -> Arc<RecordHandle> {
        if let Some(handle) = self.inner.loaded(id) {
            handle.touch();
            return handle;
        }

        let load = match self.inner.in_flight.entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // A load may have completed between the lookup above and here
                if let Some(handle) = self.inner.loaded(id) {
                    handle.touch();
                    return handle;
                }
                let inner = self.inner.clone();
                let load = async move { inner.load_record(id).await }.boxed().shared();
                entry.insert(load.clone());
                load
            }
        };

        let handle = load.await;
        handle.touch();
        handle
    }

    /// Cached record only; never touches the store
    pub fn get(&self, id: Uuid) -> Option<Arc<RecordHandle>> {
        let handle = self.inner.records.get(&id)?.clone();
        handle.touch();
        Some(handle)
    }

    /// Identity connected: load its record, refresh the username, cancel idleness
    pub async fn activate(&self, identity: &Identity) -> Arc<RecordHandle> {
        loop {
            let handle = self.get_or_create(identity.id).await;
            let guard = handle.lock_edits().await;
            // Evicted while we waited for the lock; fetch the live record
            if handle.is_evicted() {
                continue;
            }
            handle.active.store(true, Ordering::SeqCst);

            let renamed = handle.snapshot().username != identity.username;
            if renamed {
                handle.commit(&guard, |record| record.username = identity.username.clone());
                debug!("Updated username for {} to {}", identity.id, identity.username);
            }
            drop(guard);

            if renamed && !handle.is_fallback() {
                self.save(&handle);
            }
            return handle;
        }
    }

    /// Identity disconnected: evict after the grace period unless it returns
    pub fn deactivate(&self, id: Uuid) {
        let Some(handle) = self.inner.records.get(&id).map(|h| h.clone()) else {
            return;
        };
        handle.active.store(false, Ordering::SeqCst);
        handle.touch();

        let grace = read(&self.inner.config).idle_grace();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict_idle(id).await;
            }
        });
    }

    /// Queue an asynchronous write of the record's current state
    pub fn save(&self, handle: &Arc<RecordHandle>) {
        self.inner.enqueue(handle.clone());
    }

    /// Drop an idle record, flushing it first if dirty
    pub async fn evict_idle(&self, id: Uuid) -> bool {
        self.inner.evict_idle(id).await
    }

    /// Evict every record that has been idle for the grace period
    pub async fn sweep_idle(&self) -> usize {
        let grace = read(&self.inner.config).idle_grace();
        let candidates: Vec<Uuid> = self
            .inner
            .records
            .iter()
            .filter(|entry| !entry.is_active() && entry.idle_for() >= grace)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in candidates {
            if self.inner.evict_idle(id).await {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Idle sweep evicted {} records", evicted);
        }
        evicted
    }

    /// Write every dirty record now; returns how many were written
    pub async fn flush_all(&self) -> usize {
        let dirty: Vec<Arc<RecordHandle>> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.is_dirty())
            .map(|entry| entry.value().clone())
            .collect();

        let mut written = 0;
        for handle in dirty {
            if self.inner.persist_now(&handle).await {
                written += 1;
            }
        }
        written
    }

    /// Wait until every queued write has finished
    pub async fn wait_for_writes(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Flush dirty records, then forget everything that is clean
    pub async fn clear_all(&self) {
        self.flush_all().await;

        let ids: Vec<Uuid> = self.inner.records.iter().map(|entry| *entry.key()).collect();
        let mut kept = 0;
        for id in ids {
            let Some(handle) = self.inner.records.get(&id).map(|h| h.clone()) else {
                continue;
            };
            let _edit = handle.lock_edits().await;
            if handle.is_dirty() {
                kept += 1;
                continue;
            }
            handle.evicted.store(true, Ordering::SeqCst);
            self.inner.records.remove_if(&id, |_, h| Arc::ptr_eq(h, &handle));
        }

        if kept > 0 {
            warn!("Kept {} records in memory that could not be flushed", kept);
        }
    }

    /// Force every later access to read from the store again
    pub async fn reload(&self) {
        self.clear_all().await;
        info!("Player data cache reloaded");
    }

    /// Apply new cache settings. The worker pool keeps its original size.
    pub fn reconfigure(&self, config: CacheConfig) {
        *write(&self.inner.config) = config;
    }

    /// Drain queued writes and flush everything still dirty
    pub async fn shutdown(&self) {
        let queued = self.pending_writes();
        self.wait_for_writes().await;
        let flushed = self.flush_all().await;
        let dirty = self.inner.records.iter().filter(|e| e.is_dirty()).count();

        if dirty > 0 {
            error!("Persistence loss: {} records still dirty at shutdown", dirty);
        }
        info!(
            "Player data cache drained ({} queued, {} flushed)",
            queued, flushed
        );
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.records.contains_key(&id)
    }

    /// Store loads issued so far
    pub fn load_count(&self) -> u64 {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Writes queued but not yet finished
    pub fn pending_writes(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }
}

impl CacheInner {
    /// Cached record that came from a successful load
    fn loaded(&self, id: Uuid) -> Option<Arc<RecordHandle>> {
        self.records
            .get(&id)
            .map(|h| h.clone())
            .filter(|h| !h.is_fallback())
    }

    async fn load_record(&self, id: Uuid) -> Arc<RecordHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let result = {
            let _permit = self.workers.acquire().await;
            self.store.load(id).await
        };

        // Only a fallback can be cached while a load runs
        let previous = self.records.get(&id).map(|h| h.clone());

        let (record, fallback) = match result {
            Ok(Some(record)) => {
                debug!("Loaded record {}", id);
                (record, false)
            }
            Ok(None) => {
                debug!("No stored record for {}, starting empty", id);
                (CustomizationRecord::new(id), false)
            }
            Err(e) => {
                warn!("Failed to load record {}, using an unsaved fallback: {}", id, e);
                let record = previous
                    .as_ref()
                    .filter(|p| p.is_fallback())
                    .map(|p| (*p.snapshot()).clone())
                    .unwrap_or_else(|| CustomizationRecord::new(id));
                (record, true)
            }
        };

        let handle = Arc::new(RecordHandle::new(record, fallback));
        match previous {
            Some(previous) => {
                let _edit = previous.lock_edits().await;
                previous.evicted.store(true, Ordering::SeqCst);
                handle.active.store(previous.is_active(), Ordering::SeqCst);
                self.records.insert(id, handle.clone());
            }
            None => {
                self.records.insert(id, handle.clone());
            }
        }
        self.in_flight.remove(&id);
        handle
    }

    fn enqueue(&self, handle: Arc<RecordHandle>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.queue.send(handle) {
            self.finish_write();
            warn!("Save queue closed, record {} not queued", e.0.id());
        }
    }

    fn finish_write(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Persist on a worker slot; true when the record is clean afterwards
    async fn persist_now(&self, handle: &RecordHandle) -> bool {
        let _permit = self.workers.acquire().await;
        self.persist(handle).await
    }

    /// Write the latest snapshot if it is newer than what the store holds
    async fn persist(&self, handle: &RecordHandle) -> bool {
        if handle.is_fallback() {
            warn!("Not persisting record {}: its stored copy was never loaded", handle.id());
            return true;
        }
        let _order = handle.persist.lock().await;
        let (record, version) = handle.committed();
        if version <= handle.persisted.load(Ordering::SeqCst) {
            return true;
        }

        let (retries, backoff) = {
            let config = read(&self.config);
            (config.save_retries, config.retry_backoff())
        };

        let mut attempt = 0;
        loop {
            match self.store.save(&record).await {
                Ok(()) => {
                    handle.mark_persisted(version);
                    debug!("Persisted record {} at version {}", record.id, version);
                    return true;
                }
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Save of record {} failed (retry {}/{}): {}",
                        record.id, attempt, retries, e
                    );
                    tokio::time::sleep(backoff * attempt).await;
                }
                Err(e) => {
                    error!(
                        "Persistence loss: giving up on record {} after {} attempts: {}",
                        record.id,
                        attempt + 1,
                        e
                    );
                    return false;
                }
            }
        }
    }

    async fn evict_idle(&self, id: Uuid) -> bool {
        let Some(handle) = self.records.get(&id).map(|h| h.clone()) else {
            return false;
        };
        let grace = read(&self.config).idle_grace();
        if handle.is_active() || handle.idle_for() < grace {
            return false;
        }

        let _edit = handle.lock_edits().await;
        if handle.is_active() {
            return false;
        }
        if handle.is_dirty() && !self.persist_now(&handle).await {
            warn!("Keeping record {} in memory, dirty state could not be flushed", id);
            return false;
        }

        handle.evicted.store(true, Ordering::SeqCst);
        self.records.remove_if(&id, |_, h| Arc::ptr_eq(h, &handle));
        debug!("Evicted idle record {}", id);
        true
    }
}

async fn run_writer(inner: Weak<CacheInner>, mut rx: mpsc::UnboundedReceiver<Arc<RecordHandle>>) {
    while let Some(handle) = rx.recv().await {
        let Some(cache) = inner.upgrade() else {
            break;
        };
        let permit = match cache.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                cache.finish_write();
                break;
            }
        };

        tokio::spawn(async move {
            cache.persist(&handle).await;
            drop(permit);
            cache.finish_write();
        });
    }
    debug!("Save writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fast_config() -> CacheConfig {
        CacheConfig {
            idle_eviction_secs: 0,
            save_retries: 3,
            retry_backoff_ms: 1,
            ..CacheConfig::default()
        }
    }

    fn cache_with(store: Arc<MemoryStore>) -> PlayerDataCache {
        PlayerDataCache::new(store, fast_config())
    }

    async fn set_nickname(cache: &PlayerDataCache, handle: &Arc<RecordHandle>, nick: &str) {
        let guard = handle.lock_edits().await;
        handle.commit(&guard, |r| r.nickname = Some(nick.to_string()));
        drop(guard);
        cache.save(handle);
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let store = Arc::new(MemoryStore::with_load_delay(Duration::from_millis(50)));
        let cache = Arc::new(cache_with(store.clone()));
        let id = Uuid::new_v4();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_create(id).await })
            })
            .collect();

        let handles: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(store.load_count(), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_does_not_touch_store() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());

        assert!(cache.get(Uuid::new_v4()).is_none());
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn test_load_failure_yields_empty_record() {
        let store = Arc::new(MemoryStore::new());
        store.set_load_failure(true);
        let cache = cache_with(store.clone());
        let id = Uuid::new_v4();

        let handle = cache.get_or_create(id).await;
        assert!(handle.snapshot().is_empty());
        assert!(handle.is_fallback());
        assert_eq!(handle.state(), RecordState::LoadedClean);
        assert!(cache.contains(id));

        // Every access retries until the store answers
        cache.get_or_create(id).await;
        assert_eq!(store.load_count(), 2);
        assert!(handle.is_evicted());
    }

    #[tokio::test]
    async fn test_failed_load_never_overwrites_stored_record() {
        let store = Arc::new(MemoryStore::new());
        let mut record = CustomizationRecord::new(Uuid::new_v4());
        record.username = "Steve".into();
        record.nickname = Some("Nova".into());
        record.suffix = Some("§e*".into());
        store.insert(record.clone());
        store.set_load_failure(true);

        let cache = cache_with(store.clone());
        let handle = cache.activate(&Identity::new(record.id, "Alex")).await;
        assert_eq!(handle.snapshot().username, "Alex");
        assert!(!handle.is_dirty());

        cache.save(&handle);
        cache.flush_all().await;
        cache.wait_for_writes().await;
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.stored(record.id).unwrap(), record);

        // Store is back: the real record replaces the fallback and stays active
        store.set_load_failure(false);
        let live = cache.get_or_create(record.id).await;
        assert!(!live.is_fallback());
        assert!(live.is_active());
        assert!(handle.is_evicted());
        assert_eq!(live.snapshot().nickname.as_deref(), Some("Nova"));
        assert_eq!(live.snapshot().suffix.as_deref(), Some("§e*"));
    }

    #[tokio::test]
    async fn test_activate_during_eviction_follows_live_record() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(1);
        let cache = Arc::new(PlayerDataCache::new(
            store.clone(),
            CacheConfig {
                idle_eviction_secs: 0,
                save_retries: 1,
                retry_backoff_ms: 100,
                ..CacheConfig::default()
            },
        ));
        let id = Uuid::new_v4();

        let stale = cache.get_or_create(id).await;
        let guard = stale.lock_edits().await;
        stale.commit(&guard, |r| r.nickname = Some("Nova".into()));
        drop(guard);

        // Eviction holds the edit lock while its first save backs off
        let evicting = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.evict_idle(id).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let live = cache.activate(&Identity::new(id, "Steve")).await;

        assert!(evicting.await.unwrap());
        assert!(stale.is_evicted());
        assert!(!stale.is_active());
        assert!(!Arc::ptr_eq(&live, &stale));
        assert!(live.is_active());
        assert!(!live.is_evicted());
        assert!(Arc::ptr_eq(&cache.get(id).unwrap(), &live));
        assert_eq!(live.snapshot().nickname.as_deref(), Some("Nova"));
        assert_eq!(live.snapshot().username, "Steve");
    }

    #[tokio::test]
    async fn test_existing_record_loaded() {
        let store = Arc::new(MemoryStore::new());
        let mut record = CustomizationRecord::new(Uuid::new_v4());
        record.nickname = Some("Nova".into());
        store.insert(record.clone());

        let cache = cache_with(store);
        let handle = cache.get_or_create(record.id).await;
        assert_eq!(handle.snapshot().nickname.as_deref(), Some("Nova"));
    }

    #[tokio::test]
    async fn test_save_transitions_dirty_to_clean() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let handle = cache.get_or_create(Uuid::new_v4()).await;

        let guard = handle.lock_edits().await;
        handle.commit(&guard, |r| r.nickname = Some("Nova".into()));
        drop(guard);
        assert_eq!(handle.state(), RecordState::LoadedDirty);

        cache.save(&handle);
        cache.wait_for_writes().await;

        assert_eq!(handle.state(), RecordState::LoadedClean);
        assert_eq!(cache.pending_writes(), 0);
        assert_eq!(
            store.stored(handle.id()).unwrap().nickname.as_deref(),
            Some("Nova")
        );
    }

    #[tokio::test]
    async fn test_latest_version_wins() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let handle = cache.get_or_create(Uuid::new_v4()).await;

        for nick in ["One", "Two", "Three"] {
            set_nickname(&cache, &handle, nick).await;
        }
        cache.wait_for_writes().await;

        assert_eq!(handle.version(), 3);
        assert!(!handle.is_dirty());
        assert_eq!(
            store.stored(handle.id()).unwrap().nickname.as_deref(),
            Some("Three")
        );
    }

    #[tokio::test]
    async fn test_save_retries_then_succeeds() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(2);
        let cache = cache_with(store.clone());
        let handle = cache.get_or_create(Uuid::new_v4()).await;

        set_nickname(&cache, &handle, "Nova").await;
        cache.wait_for_writes().await;

        assert!(!handle.is_dirty());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_save_exhaustion_keeps_record_dirty() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(100);
        let cache = PlayerDataCache::new(
            store.clone(),
            CacheConfig {
                save_retries: 1,
                retry_backoff_ms: 1,
                ..CacheConfig::default()
            },
        );
        let handle = cache.get_or_create(Uuid::new_v4()).await;

        set_nickname(&cache, &handle, "Nova").await;
        cache.wait_for_writes().await;

        assert!(handle.is_dirty());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_evict_idle_flushes_then_reloads() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let id = Uuid::new_v4();

        let handle = cache.activate(&Identity::new(id, "Steve")).await;
        assert!(!cache.evict_idle(id).await, "active records stay");

        let guard = handle.lock_edits().await;
        handle.commit(&guard, |r| r.nickname = Some("Nova".into()));
        drop(guard);

        handle.active.store(false, Ordering::SeqCst);
        assert!(cache.evict_idle(id).await);
        assert!(handle.is_evicted());
        assert!(cache.get(id).is_none());
        assert_eq!(store.stored(id).unwrap().nickname.as_deref(), Some("Nova"));

        let reloaded = cache.get_or_create(id).await;
        assert_eq!(store.load_count(), 2);
        assert_eq!(reloaded.snapshot().username, "Steve");
        assert_eq!(reloaded.snapshot().nickname.as_deref(), Some("Nova"));
    }

    #[tokio::test]
    async fn test_grace_period_keeps_recent_records() {
        let store = Arc::new(MemoryStore::new());
        let cache = PlayerDataCache::new(store, CacheConfig::default());
        let id = Uuid::new_v4();

        cache.activate(&Identity::new(id, "Steve")).await;
        cache.deactivate(id);

        assert!(!cache.evict_idle(id).await);
        assert_eq!(cache.sweep_idle().await, 0);
        assert!(cache.contains(id));
    }

    #[tokio::test]
    async fn test_deactivate_schedules_eviction() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store);
        let id = Uuid::new_v4();

        cache.activate(&Identity::new(id, "Steve")).await;
        cache.wait_for_writes().await;
        cache.deactivate(id);

        for _ in 0..50 {
            if !cache.contains(id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!cache.contains(id));
    }

    #[tokio::test]
    async fn test_activate_refreshes_username() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let id = Uuid::new_v4();

        cache.activate(&Identity::new(id, "Steve")).await;
        let handle = cache.activate(&Identity::new(id, "Alex")).await;
        cache.wait_for_writes().await;

        assert_eq!(handle.snapshot().username, "Alex");
        assert_eq!(handle.version(), 2);
        assert_eq!(store.stored(id).unwrap().username, "Alex");
    }

    #[tokio::test]
    async fn test_clear_all_flushes_and_forgets() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let handle = cache.get_or_create(Uuid::new_v4()).await;

        let guard = handle.lock_edits().await;
        handle.commit(&guard, |r| r.suffix = Some("§e*".into()));
        drop(guard);

        cache.reload().await;
        assert!(cache.is_empty());
        assert_eq!(store.stored(handle.id()).unwrap().suffix.as_deref(), Some("§e*"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());

        let mut ids = Vec::new();
        for i in 0..8 {
            let handle = cache.get_or_create(Uuid::new_v4()).await;
            set_nickname(&cache, &handle, &format!("Nick{}", i)).await;
            ids.push(handle.id());
        }

        cache.shutdown().await;
        assert_eq!(cache.pending_writes(), 0);
        for id in ids {
            assert!(store.stored(id).is_some());
        }
    }
}
