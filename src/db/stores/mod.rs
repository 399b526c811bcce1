use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{KvKey, KvRecord};

pub use self::memory::MemoryKvBackend;

mod memory;

/// Durable side of the key/value store. Reads are served from memory, so a
/// backend only has to hydrate at startup and absorb batched writes.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn load_all(&self) -> Result<Vec<KvRecord>, DatabaseError>;
    async fn apply(&self, upserts: &[KvRecord], deletes: &[KvKey]) -> Result<(), DatabaseError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError>;
}
