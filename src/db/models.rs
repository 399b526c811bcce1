use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::DatabaseError;
use super::schema::kv_entries;

/// One persisted entry of a named collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvRecord {
    pub collection: String,
    pub key: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KvKey {
    pub collection: String,
    pub key: String,
}

/// Where a Telegram message points on the forum side: a topic, and a post
/// inside it when the message mirrors one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLink {
    pub topic_id: i64,
    #[serde(default)]
    pub post_number: Option<i64>,
}

/// Whether a mirrored message carries its body as text or as a photo caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Caption,
}

/// The Telegram message produced for a forum post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredMessage {
    pub message_id: i64,
    pub kind: MessageKind,
}

/// Pairing between a Telegram group message and a forum chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLink {
    pub telegram_message_id: i64,
    pub forum_message_id: i64,
    /// The mirrored body started with an author header.
    #[serde(default)]
    pub has_header: bool,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub uid: i64,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequestRecord {
    pub user_id: i64,
    pub user_chat_id: i64,
    pub display_name: String,
    pub requested_at: DateTime<Utc>,
}

/// Explicit mirror state of a correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState<T> {
    Unmirrored,
    Mirrored(T),
}

impl<T> MirrorState<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Mirrored(value),
            None => Self::Unmirrored,
        }
    }

    pub fn mirrored(self) -> Option<T> {
        match self {
            Self::Mirrored(value) => Some(value),
            Self::Unmirrored => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = kv_entries)]
pub(crate) struct DbKvEntry {
    pub collection: String,
    pub entry_key: String,
    pub value: String,
    pub expires_at: Option<String>,
    pub updated_at: String,
}

impl DbKvEntry {
    pub(crate) fn into_record(self) -> Result<KvRecord, DatabaseError> {
        let expires_at = self
            .expires_at
            .as_deref()
            .map(string_to_datetime)
            .transpose()?;
        Ok(KvRecord {
            collection: self.collection,
            key: self.entry_key,
            value: self.value,
            expires_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = kv_entries)]
pub(crate) struct NewKvEntry<'a> {
    pub collection: &'a str,
    pub entry_key: &'a str,
    pub value: &'a str,
    pub expires_at: Option<String>,
    pub updated_at: String,
}

impl<'a> NewKvEntry<'a> {
    pub(crate) fn from_record(record: &'a KvRecord, now: &DateTime<Utc>) -> Self {
        Self {
            collection: &record.collection,
            entry_key: &record.key,
            value: &record.value,
            expires_at: record.expires_at.as_ref().map(datetime_to_string),
            updated_at: datetime_to_string(now),
        }
    }
}

// Fixed-width UTC timestamps so text comparison orders them in time.
pub(crate) fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}
