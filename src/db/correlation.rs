use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::kv::{CollectionPolicy, KvStore};
use super::models::{
    ChatLink, JoinRequestRecord, MessageLink, MirrorState, MirroredMessage, PendingLogin,
};
use crate::config::StoreConfig;

/// Named collections kept by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Telegram message id → forum topic/post it refers to.
    PostByTelegram,
    /// Forum post id → Telegram message mirroring it.
    TelegramByPost,
    /// Telegram message id → forum post created from it.
    ForwardedPost,
    ChatByTelegram,
    ChatByForum,
    /// Forum chat message ids written by the bridge itself.
    SuppressedEcho,
    Credentials,
    PendingLogins,
    JoinRequests,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::PostByTelegram,
        Collection::TelegramByPost,
        Collection::ForwardedPost,
        Collection::ChatByTelegram,
        Collection::ChatByForum,
        Collection::SuppressedEcho,
        Collection::Credentials,
        Collection::PendingLogins,
        Collection::JoinRequests,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::PostByTelegram => "post_by_telegram",
            Collection::TelegramByPost => "telegram_by_post",
            Collection::ForwardedPost => "forwarded_post",
            Collection::ChatByTelegram => "chat_by_telegram",
            Collection::ChatByForum => "chat_by_forum",
            Collection::SuppressedEcho => "suppressed_echo",
            Collection::Credentials => "credentials",
            Collection::PendingLogins => "pending_logins",
            Collection::JoinRequests => "join_requests",
        }
    }

    pub fn policy(self, config: &StoreConfig) -> CollectionPolicy {
        let link_ttl = Duration::from_secs(config.link_ttl_hours * 3600);
        match self {
            Collection::PostByTelegram
            | Collection::TelegramByPost
            | Collection::ForwardedPost
            | Collection::ChatByTelegram
            | Collection::ChatByForum => {
                CollectionPolicy::new(Duration::from_secs(30), Some(link_ttl))
            }
            Collection::SuppressedEcho => {
                CollectionPolicy::new(Duration::from_secs(5), Some(Duration::from_secs(600)))
            }
            Collection::Credentials => CollectionPolicy::new(Duration::ZERO, None),
            Collection::PendingLogins => CollectionPolicy::new(
                Duration::ZERO,
                Some(Duration::from_secs(config.nonce_ttl_secs)),
            ),
            Collection::JoinRequests => CollectionPolicy::new(
                Duration::from_secs(30),
                Some(Duration::from_secs(7 * 24 * 3600)),
            ),
        }
    }
}

/// Typed view over the key/value store holding every identity mapping of
/// the bridge. Both directions of a link are written together.
#[derive(Clone)]
pub struct CorrelationStore {
    kv: Arc<KvStore>,
}

impl CorrelationStore {
    pub fn new(kv: Arc<KvStore>, config: &StoreConfig) -> Self {
        for collection in Collection::ALL {
            kv.register(collection.name(), collection.policy(config));
        }
        Self { kv }
    }

    #[cfg(test)]
    pub fn kv(&self) -> &Arc<KvStore> {
        &self.kv
    }

    fn get<T: DeserializeOwned>(&self, collection: Collection, key: impl ToString) -> Option<T> {
        let key = key.to_string();
        let raw = self.kv.get(collection.name(), &key)?;
        decode(collection, &key, &raw)
    }

    fn set<T: Serialize>(&self, collection: Collection, key: impl ToString, value: &T) {
        let key = key.to_string();
        match serde_json::to_string(value) {
            Ok(raw) => self.kv.set(collection.name(), &key, raw),
            Err(err) => warn!(
                collection = collection.name(),
                key = %key,
                "Failed to encode value: {err}"
            ),
        }
    }

    fn take<T: DeserializeOwned>(&self, collection: Collection, key: impl ToString) -> Option<T> {
        let key = key.to_string();
        let raw = self.kv.take(collection.name(), &key)?;
        decode(collection, &key, &raw)
    }

    pub fn post_link(&self, telegram_message_id: i64) -> Option<MessageLink> {
        self.get(Collection::PostByTelegram, telegram_message_id)
    }

    pub fn link_post(&self, telegram_message_id: i64, link: MessageLink) {
        self.set(Collection::PostByTelegram, telegram_message_id, &link);
    }

    pub fn post_mirror(&self, post_id: i64) -> MirrorState<MirroredMessage> {
        MirrorState::from_option(self.get(Collection::TelegramByPost, post_id))
    }

    /// Records the Telegram message mirroring `post_id` and points it back
    /// at the post so replies land in the right place.
    pub fn record_post_mirror(&self, post_id: i64, mirrored: MirroredMessage, link: MessageLink) {
        self.set(Collection::TelegramByPost, post_id, &mirrored);
        self.link_post(mirrored.message_id, link);
    }

    pub fn forget_post_mirror(&self, post_id: i64) -> MirrorState<MirroredMessage> {
        MirrorState::from_option(self.take(Collection::TelegramByPost, post_id))
    }

    pub fn forwarded_post(&self, telegram_message_id: i64) -> Option<i64> {
        self.get(Collection::ForwardedPost, telegram_message_id)
    }

    pub fn link_forwarded_post(&self, telegram_message_id: i64, post_id: i64) {
        self.set(Collection::ForwardedPost, telegram_message_id, &post_id);
    }

    pub fn chat_by_telegram(&self, telegram_message_id: i64) -> Option<ChatLink> {
        self.get(Collection::ChatByTelegram, telegram_message_id)
    }

    pub fn chat_mirror(&self, forum_message_id: i64) -> MirrorState<ChatLink> {
        MirrorState::from_option(self.get(Collection::ChatByForum, forum_message_id))
    }

    pub fn link_chat(&self, link: ChatLink) {
        self.set(Collection::ChatByTelegram, link.telegram_message_id, &link);
        self.set(Collection::ChatByForum, link.forum_message_id, &link);
    }

    /// Points an extra Telegram message (e.g. a media group item) at an
    /// existing chat link without touching the forum direction.
    pub fn alias_chat(&self, telegram_message_id: i64, link: &ChatLink) {
        self.set(Collection::ChatByTelegram, telegram_message_id, link);
    }

    pub fn mark_suppressed(&self, forum_message_id: i64) {
        self.set(Collection::SuppressedEcho, forum_message_id, &true);
    }

    pub fn take_suppressed(&self, forum_message_id: i64) -> bool {
        self.take::<bool>(Collection::SuppressedEcho, forum_message_id)
            .unwrap_or(false)
    }

    pub fn credential(&self, uid: i64) -> Option<String> {
        self.get(Collection::Credentials, uid)
    }

    pub fn bind_credential(&self, uid: i64, key: &str) {
        self.set(Collection::Credentials, uid, &key);
    }

    pub fn unbind_credential(&self, uid: i64) -> Option<String> {
        self.take(Collection::Credentials, uid)
    }

    pub fn record_pending_login(&self, nonce: &str, pending: PendingLogin) {
        self.set(Collection::PendingLogins, nonce, &pending);
    }

    pub fn take_pending_login(&self, nonce: &str) -> Option<PendingLogin> {
        self.take(Collection::PendingLogins, nonce)
    }

    pub fn join_request(&self, user_chat_id: i64) -> Option<JoinRequestRecord> {
        self.get(Collection::JoinRequests, user_chat_id)
    }

    pub fn record_join_request(&self, record: &JoinRequestRecord) {
        self.set(Collection::JoinRequests, record.user_chat_id, record);
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                collection = collection.name(),
                key = %key,
                "Ignoring undecodable entry: {err}"
            );
            None
        }
    }
}
