use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::records::CanonicalRecord;
use crate::storage::{
    BatchInsertResult, CacheError, CacheProvider, StorageError, StorageProvider,
};
use crate::time::{SystemTime, TimeSource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process analytics store. Keeps every inserted row, and can be told to
/// fail to exercise the store-failure path.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    rows: Arc<Mutex<Vec<(String, CanonicalRecord)>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<(String, CanonicalRecord)> {
        lock(&self.rows).clone()
    }

    pub fn rows_for(&self, table: &str) -> Vec<CanonicalRecord> {
        lock(&self.rows)
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, table: &str, record: &CanonicalRecord) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Insert {
                table: table.to_owned(),
                message: "memory storage is failing".to_owned(),
            });
        }
        lock(&self.rows).push((table.to_owned(), record.clone()));
        Ok(())
    }

    async fn insert_batch(&self, table: &str, records: &[CanonicalRecord]) -> BatchInsertResult {
        if self.failing.load(Ordering::SeqCst) {
            return BatchInsertResult::failed("memory storage is failing");
        }
        let mut rows = lock(&self.rows);
        rows.extend(records.iter().map(|r| (table.to_owned(), r.clone())));
        BatchInsertResult {
            processed: records.len(),
            errors: vec![],
        }
    }

    async fn is_healthy(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

struct Entry {
    value: String,
    expires_at: Option<i64>,
}

/// In-process cache. The map lock makes `set_nx` atomic; expiry is checked
/// lazily against the injected clock.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn TimeSource + Send + Sync>,
    failing: Arc<AtomicBool>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_clock(SystemTime {})
    }
}

impl MemoryCache {
    pub fn with_clock<T: TimeSource + Send + Sync + 'static>(clock: T) -> Self {
        Self {
            entries: Default::default(),
            clock: Arc::new(clock),
            failing: Default::default(),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Backend("memory cache is failing".to_owned()))
        } else {
            Ok(())
        }
    }

    fn expiry(&self, ttl_seconds: Option<u64>) -> Option<i64> {
        ttl_seconds.map(|ttl| self.clock.now_millis() + (ttl as i64) * 1000)
    }

    fn live_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        let now = self.clock.now_millis();
        let mut entries = lock(&self.entries);
        entries.retain(|_, e| e.expires_at.map_or(true, |at| at > now));
        entries
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.live_entries().get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), CacheError> {
        self.check()?;
        let entry = Entry {
            value: value.to_owned(),
            expires_at: self.expiry(ttl_seconds),
        };
        self.live_entries().insert(key.to_owned(), entry);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, CacheError> {
        self.check()?;
        let mut entries = self.live_entries();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: self.expiry(Some(ttl_seconds)),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        Ok(self.live_entries().contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.live_entries().remove(key);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.check().is_ok()
    }
}
