use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::KvBackend;
use crate::db::DatabaseError;
use crate::db::models::{KvKey, KvRecord};

/// Process-local backend for `memory://` and tests. Can be told to fail
/// writes to exercise the retry path.
#[derive(Default)]
pub struct MemoryKvBackend {
    records: Mutex<HashMap<(String, String), KvRecord>>,
    failing: AtomicBool,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<KvRecord> {
        self.records
            .lock()
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn load_all(&self) -> Result<Vec<KvRecord>, DatabaseError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn apply(&self, upserts: &[KvRecord], deletes: &[KvKey]) -> Result<(), DatabaseError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("memory backend is failing".to_string()));
        }
        let mut records = self.records.lock();
        for record in upserts {
            records.insert(
                (record.collection.clone(), record.key.clone()),
                record.clone(),
            );
        }
        for key in deletes {
            records.remove(&(key.collection.clone(), key.key.clone()));
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.expires_at.is_none_or(|at| at > now));
        Ok((before - records.len()) as u64)
    }
}
