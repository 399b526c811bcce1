use serde::{Deserialize, Serialize};

/// Who a forum write is performed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// The bridge's own system API key.
    Bridge,
    /// A user API key obtained through the login handshake.
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub topic_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_post_number: Option<i64>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedPost {
    pub id: i64,
    pub topic_id: i64,
    #[serde(default)]
    pub post_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SentChatMessage {
    pub message_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicPage {
    #[serde(default)]
    pub topics: Vec<TopicSummary>,
    #[serde(default)]
    pub more_topics_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LatestResponse {
    pub topic_list: TopicPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicPosts {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub post_stream: PostStream,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostStream {
    #[serde(default)]
    pub posts: Vec<PostSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostSummary {
    pub username: String,
    pub cooked: String,
}

/// Body of a `post_*` webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PostWebhook {
    pub post: PostPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostPayload {
    pub id: i64,
    pub topic_id: i64,
    #[serde(default)]
    pub post_number: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub cooked: String,
    #[serde(default)]
    pub topic_title: String,
}

/// Body of a `chat_message_*` webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatWebhook {
    pub message: ChatMessagePayload,
    pub channel: ChatChannel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessagePayload {
    pub id: i64,
    #[serde(default)]
    pub cooked: String,
    pub user: ChatUser,
    #[serde(default)]
    pub in_reply_to: Option<ChatReplyRef>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub uploads: Vec<ChatUpload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUser {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReplyRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUpload {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChannel {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

/// Forum event named by the `X-Discourse-Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForumEvent {
    PostCreated,
    PostEdited,
    PostDestroyed,
    ChatMessageCreated,
    ChatMessageEdited,
    ChatMessageTrashed,
}

impl ForumEvent {
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "post_created" => Some(Self::PostCreated),
            "post_edited" => Some(Self::PostEdited),
            "post_destroyed" => Some(Self::PostDestroyed),
            "chat_message_created" => Some(Self::ChatMessageCreated),
            "chat_message_edited" => Some(Self::ChatMessageEdited),
            "chat_message_trashed" => Some(Self::ChatMessageTrashed),
            _ => None,
        }
    }
}
