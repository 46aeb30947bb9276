//! Durable customization storage
//!
//! The cache only talks to [`CustomizationStore`]. Two adapters ship with the
//! crate: an in-memory map and a directory of JSON documents.

use crate::error::{RegaliaError, Result};
use crate::record::CustomizationRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Durable load/save of customization records. `save` must be idempotent.
#[async_trait]
pub trait CustomizationStore: Send + Sync {
    /// `Ok(None)` when the identity has never been saved
    async fn load(&self, id: Uuid) -> Result<Option<CustomizationRecord>>;

    async fn save(&self, record: &CustomizationRecord) -> Result<()>;
}

// ========== In-memory store ==========

/// Map-backed store with counters and failure injection
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, CustomizationRecord>,
    loads: AtomicU64,
    saves: AtomicU64,
    fail_loads: AtomicBool,
    failing_saves: AtomicU32,
    load_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load sleeps for `delay` before answering
    pub fn with_load_delay(delay: Duration) -> Self {
        Self {
            load_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Seed a record without counting it as a save
    pub fn insert(&self, record: CustomizationRecord) {
        self.records.insert(record.id, record);
    }

    /// Stored copy of a record
    pub fn stored(&self, id: Uuid) -> Option<CustomizationRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    pub fn set_load_failure(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// The next `count` saves fail
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Successful saves only
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CustomizationStore for MemoryStore {
    async fn load(&self, id: Uuid) -> Result<Option<CustomizationRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(RegaliaError::StoreUnavailable("memory store offline".into()));
        }
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn save(&self, record: &CustomizationRecord) -> Result<()> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RegaliaError::StoreUnavailable("memory store rejected save".into()));
        }
        self.records.insert(record.id, record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ========== JSON file store ==========

/// One `<uuid>.json` document per identity
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Create the data directory if needed
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl CustomizationStore for JsonFileStore {
    async fn load(&self, id: Uuid) -> Result<Option<CustomizationRecord>> {
        let path = self.record_path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RegaliaError::StoreUnavailable(format!("{:?}: {}", path, e))),
        };

        let mut record: CustomizationRecord = serde_json::from_str(&content)?;
        record.id = id;
        Ok(Some(record))
    }

    async fn save(&self, record: &CustomizationRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(record.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Wrote {:?}", path);
        Ok(())
    }
}
