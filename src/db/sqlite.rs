use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use std::sync::Arc;

use crate::db::schema::kv_entries;

use super::{
    DatabaseError,
    models::{DbKvEntry, KvKey, KvRecord, NewKvEntry, datetime_to_string},
    stores::KvBackend,
};

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))
}

pub struct SqliteKvBackend {
    db_path: Arc<String>,
}

impl SqliteKvBackend {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl KvBackend for SqliteKvBackend {
    async fn load_all(&self) -> Result<Vec<KvRecord>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let rows = kv_entries::table
                .select(DbKvEntry::as_select())
                .load::<DbKvEntry>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            rows.into_iter().map(DbKvEntry::into_record).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn apply(&self, upserts: &[KvRecord], deletes: &[KvKey]) -> Result<(), DatabaseError> {
        let upserts = upserts.to_vec();
        let deletes = deletes.to_vec();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let now = Utc::now();
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                for record in &upserts {
                    diesel::insert_into(kv_entries::table)
                        .values(NewKvEntry::from_record(record, &now))
                        .on_conflict((kv_entries::collection, kv_entries::entry_key))
                        .do_update()
                        .set((
                            kv_entries::value.eq(excluded(kv_entries::value)),
                            kv_entries::expires_at.eq(excluded(kv_entries::expires_at)),
                            kv_entries::updated_at.eq(excluded(kv_entries::updated_at)),
                        ))
                        .execute(conn)?;
                }
                for key in &deletes {
                    diesel::delete(
                        kv_entries::table
                            .filter(kv_entries::collection.eq(&key.collection))
                            .filter(kv_entries::entry_key.eq(&key.key)),
                    )
                    .execute(conn)?;
                }
                Ok(())
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::delete(
                kv_entries::table.filter(kv_entries::expires_at.le(datetime_to_string(&now))),
            )
            .execute(&mut conn)
            .map(|count| count as u64)
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
