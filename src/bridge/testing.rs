//! In-memory platform fakes recording every outbound call.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::BridgeCore;
use crate::auth::{AuthHandshake, KeyPair};
use crate::config::Config;
use crate::db::{CorrelationStore, KvStore, MemoryKvBackend};
use crate::discourse::types::{
    ChatChannel, ChatMessagePayload, ChatReplyRef, ChatUser, PostPayload,
};
use crate::discourse::{
    ChatWebhook, CreatedPost, Credential, ForumApi, NewPost, PostWebhook, TopicPage, TopicPosts,
};
use crate::error::PlatformError;
use crate::telegram::types::Chat;
use crate::telegram::{Message, SendOptions, TelegramApi, User};

pub const GROUP: i64 = -100;
pub const CHANNEL: i64 = 2;

const CONFIG: &str = r#"
telegram:
  group_id: -100
  post_bot_token: post-token
  sync_bot_token: sync-token
  post_bot_username: PostBot
  sync_bot_username: SyncBot
discourse:
  url: https://forum.example.org/
  channel_id: 2
  api_username: system
  api_key: forum-key
  bot_username: system
bridge:
  sync_chat: true
  echo_settle_ms: 1
database:
  url: "memory://"
"#;

static TEST_KEYS: Lazy<KeyPair> =
    Lazy::new(|| KeyPair::generate(1024).expect("test key generation"));

/// Shared 1024-bit key pair; generating one per test is slow.
pub fn test_keys() -> KeyPair {
    TEST_KEYS.clone()
}

pub fn test_store() -> CorrelationStore {
    let kv = Arc::new(KvStore::new(Arc::new(MemoryKvBackend::new())));
    CorrelationStore::new(kv, &Default::default())
}

/// A bridge wired to fakes on both sides.
pub struct Harness {
    pub bridge: Arc<BridgeCore>,
    pub post_bot: Arc<FakeTelegram>,
    pub sync_bot: Arc<FakeTelegram>,
    pub forum: Arc<FakeForum>,
    pub store: CorrelationStore,
    pub auth: Arc<AuthHandshake>,
}

impl Harness {
    pub fn new() -> Self {
        let config = Arc::new(Config::from_yaml(CONFIG).expect("test config"));
        let store = test_store();
        let auth = Arc::new(AuthHandshake::new(
            test_keys(),
            store.clone(),
            config.forum_url(),
            config.auth.clone(),
        ));
        let post_bot = Arc::new(FakeTelegram::default());
        let sync_bot = Arc::new(FakeTelegram::default());
        let forum = Arc::new(FakeForum::default());
        let bridge = Arc::new(BridgeCore::new(
            config,
            post_bot.clone(),
            sync_bot.clone(),
            forum.clone(),
            store.clone(),
            auth.clone(),
        ));
        Self {
            bridge,
            post_bot,
            sync_bot,
            forum,
            store,
            auth,
        }
    }
}

pub fn post_webhook(id: i64, cooked: &str) -> PostWebhook {
    PostWebhook {
        post: PostPayload {
            id,
            topic_id: 7,
            post_number: Some(3),
            username: "ann".to_string(),
            cooked: cooked.to_string(),
            topic_title: "Hello".to_string(),
        },
    }
}

pub fn chat_webhook(id: i64, username: &str, cooked: &str, in_reply_to: Option<i64>) -> ChatWebhook {
    ChatWebhook {
        message: ChatMessagePayload {
            id,
            cooked: cooked.to_string(),
            user: ChatUser {
                username: username.to_string(),
            },
            in_reply_to: in_reply_to.map(|id| ChatReplyRef { id }),
            deleted_at: None,
            uploads: Vec::new(),
        },
        channel: ChatChannel {
            id: Some(CHANNEL),
            slug: "authened".to_string(),
            title: "Lobby".to_string(),
        },
    }
}

pub fn user(id: i64, first_name: &str) -> User {
    User {
        id,
        is_bot: false,
        first_name: first_name.to_string(),
        username: Some(first_name.to_lowercase()),
    }
}

pub fn bot_user(id: i64, username: &str) -> User {
    User {
        id,
        is_bot: true,
        first_name: username.to_string(),
        username: Some(username.to_string()),
    }
}

pub fn group_message(message_id: i64, from: User, text: &str) -> Message {
    Message {
        message_id,
        from: Some(from),
        chat: Chat {
            id: GROUP,
            kind: "supergroup".to_string(),
            title: Some("Group".to_string()),
        },
        text: Some(text.to_string()),
        ..Message::default()
    }
}

pub fn private_message(message_id: i64, from: User, text: &str) -> Message {
    Message {
        message_id,
        chat: Chat {
            id: from.id,
            kind: "private".to_string(),
            title: None,
        },
        from: Some(from),
        text: Some(text.to_string()),
        ..Message::default()
    }
}

pub fn reply(mut message: Message, replied: Message) -> Message {
    message.reply_to_message = Some(Box::new(replied));
    message
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramCall {
    SendText { chat_id: i64, text: String, reply_to: Option<i64> },
    SendPhoto { chat_id: i64, photo: String, caption: Option<String> },
    SendMediaGroup { chat_id: i64, photos: Vec<String> },
    EditText { message_id: i64, text: String },
    EditCaption { message_id: i64, caption: String },
    Delete { message_id: i64 },
    Approve { user_id: i64 },
}

pub struct FakeTelegram {
    next_id: AtomicI64,
    calls: Mutex<Vec<TelegramCall>>,
    failing: Mutex<HashSet<&'static str>>,
    unreachable: Mutex<HashSet<i64>>,
}

impl Default for FakeTelegram {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            unreachable: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeTelegram {
    /// Makes the next call of `operation` fail with a 400 from the Bot API.
    pub fn fail_next(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    /// Every send to `chat_id` fails, as when a user blocked the bot.
    pub fn block_chat(&self, chat_id: i64) {
        self.unreachable.lock().insert(chat_id);
    }

    fn check(&self, operation: &'static str, chat_id: i64) -> Result<(), PlatformError> {
        if self.unreachable.lock().contains(&chat_id) {
            return Err(PlatformError::api(
                403,
                "Forbidden",
                vec!["bot was blocked by the user".to_string()],
            ));
        }
        if self.failing.lock().remove(operation) {
            return Err(PlatformError::api(
                400,
                "Bad Request",
                vec!["message is too long".to_string()],
            ));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<TelegramCall> {
        self.calls.lock().clone()
    }

    /// Calls that create a new Telegram message.
    pub fn sends(&self) -> Vec<TelegramCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    TelegramCall::SendText { .. }
                        | TelegramCall::SendPhoto { .. }
                        | TelegramCall::SendMediaGroup { .. }
                )
            })
            .collect()
    }

    pub fn texts_to(&self, chat: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TelegramCall::SendText { chat_id, text, .. } if chat_id == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TelegramCall) -> i64 {
        self.calls.lock().push(call);
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<i64, PlatformError> {
        self.check("send_text", chat_id)?;
        Ok(self.record(TelegramCall::SendText {
            chat_id,
            text: text.to_string(),
            reply_to: options.reply_to,
        }))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: Option<&str>,
        _options: &SendOptions,
    ) -> Result<i64, PlatformError> {
        self.check("send_photo", chat_id)?;
        Ok(self.record(TelegramCall::SendPhoto {
            chat_id,
            photo: photo.to_string(),
            caption: caption.map(ToOwned::to_owned),
        }))
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        _options: &SendOptions,
    ) -> Result<Vec<i64>, PlatformError> {
        self.check("send_media_group", chat_id)?;
        let first = self.record(TelegramCall::SendMediaGroup {
            chat_id,
            photos: photos.to_vec(),
        });
        let rest = (1..photos.len()).map(|_| self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(std::iter::once(first).chain(rest).collect())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        _options: &SendOptions,
    ) -> Result<(), PlatformError> {
        self.check("edit_text", chat_id)?;
        self.record(TelegramCall::EditText {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
    ) -> Result<(), PlatformError> {
        self.check("edit_caption", chat_id)?;
        self.record(TelegramCall::EditCaption {
            message_id,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), PlatformError> {
        self.check("delete_message", chat_id)?;
        self.record(TelegramCall::Delete { message_id });
        Ok(())
    }

    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError> {
        self.check("approve_join_request", chat_id)?;
        self.record(TelegramCall::Approve { user_id });
        Ok(())
    }

    async fn file_link(&self, file_id: &str) -> Result<String, PlatformError> {
        Ok(format!("https://api.telegram.org/file/botTOKEN/{file_id}.jpg"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumCall {
    CreatePost { credential: Credential, post: NewPost },
    UpdatePost { credential: Credential, post_id: i64, raw: String },
    SendChat { credential: Credential, message: String, in_reply_to: Option<i64> },
    EditChat { credential: Credential, message_id: i64, message: String },
}

pub struct FakeForum {
    next_id: AtomicI64,
    calls: Mutex<Vec<ForumCall>>,
    failing: Mutex<HashSet<&'static str>>,
    revoked: Mutex<Vec<String>>,
    pub latest: Mutex<TopicPage>,
    pub topic: Mutex<TopicPosts>,
}

impl Default for FakeForum {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(500),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            revoked: Mutex::new(Vec::new()),
            latest: Mutex::new(TopicPage::default()),
            topic: Mutex::new(TopicPosts::default()),
        }
    }
}

impl FakeForum {
    /// Makes the next call of `operation` fail with a 422 carrying an error array.
    pub fn fail_next(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    pub fn calls(&self) -> Vec<ForumCall> {
        self.calls.lock().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }

    fn check(&self, operation: &'static str) -> Result<(), PlatformError> {
        if self.failing.lock().remove(operation) {
            return Err(PlatformError::api(
                422,
                "Unprocessable Entity",
                vec!["Body is too short".to_string()],
            ));
        }
        Ok(())
    }

    fn record(&self, call: ForumCall) -> i64 {
        self.calls.lock().push(call);
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl ForumApi for FakeForum {
    async fn create_post(
        &self,
        credential: &Credential,
        post: &NewPost,
    ) -> Result<CreatedPost, PlatformError> {
        self.check("create_post")?;
        let id = self.record(ForumCall::CreatePost {
            credential: credential.clone(),
            post: post.clone(),
        });
        Ok(CreatedPost {
            id,
            topic_id: post.topic_id,
            post_number: Some(id),
        })
    }

    async fn update_post(
        &self,
        credential: &Credential,
        post_id: i64,
        raw: &str,
    ) -> Result<(), PlatformError> {
        self.check("update_post")?;
        self.record(ForumCall::UpdatePost {
            credential: credential.clone(),
            post_id,
            raw: raw.to_string(),
        });
        Ok(())
    }

    async fn send_chat_message(
        &self,
        credential: &Credential,
        _channel_id: i64,
        message: &str,
        in_reply_to: Option<i64>,
    ) -> Result<i64, PlatformError> {
        self.check("send_chat_message")?;
        Ok(self.record(ForumCall::SendChat {
            credential: credential.clone(),
            message: message.to_string(),
            in_reply_to,
        }))
    }

    async fn edit_chat_message(
        &self,
        credential: &Credential,
        _channel_id: i64,
        message_id: i64,
        message: &str,
    ) -> Result<(), PlatformError> {
        self.check("edit_chat_message")?;
        self.record(ForumCall::EditChat {
            credential: credential.clone(),
            message_id,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn latest_topics(&self, _cursor: &str) -> Result<TopicPage, PlatformError> {
        self.check("latest_topics")?;
        Ok(self.latest.lock().clone())
    }

    async fn topic_recent_posts(&self, _topic_id: i64) -> Result<TopicPosts, PlatformError> {
        self.check("topic_recent_posts")?;
        Ok(self.topic.lock().clone())
    }

    async fn revoke_user_api_key(&self, key: &str) -> Result<(), PlatformError> {
        self.check("revoke")?;
        self.revoked.lock().push(key.to_string());
        Ok(())
    }
}
