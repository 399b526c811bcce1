use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::config::DiscourseConfig;
use crate::error::PlatformError;

pub use self::types::{
    ChatWebhook, CreatedPost, Credential, ForumEvent, NewPost, PostPayload, PostSummary,
    PostWebhook, TopicPage, TopicPosts, TopicSummary,
};

pub mod types;

use self::types::{LatestResponse, SentChatMessage};

#[async_trait]
pub trait ForumApi: Send + Sync {
    async fn create_post(
        &self,
        credential: &Credential,
        post: &NewPost,
    ) -> Result<CreatedPost, PlatformError>;

    async fn update_post(
        &self,
        credential: &Credential,
        post_id: i64,
        raw: &str,
    ) -> Result<(), PlatformError>;

    /// Returns the id of the new chat message.
    async fn send_chat_message(
        &self,
        credential: &Credential,
        channel_id: i64,
        message: &str,
        in_reply_to: Option<i64>,
    ) -> Result<i64, PlatformError>;

    async fn edit_chat_message(
        &self,
        credential: &Credential,
        channel_id: i64,
        message_id: i64,
        message: &str,
    ) -> Result<(), PlatformError>;

    /// One page of the latest-topics list. `cursor` is `/latest` or the
    /// `more_topics_url` of the previous page.
    async fn latest_topics(&self, cursor: &str) -> Result<TopicPage, PlatformError>;

    async fn topic_recent_posts(&self, topic_id: i64) -> Result<TopicPosts, PlatformError>;

    async fn revoke_user_api_key(&self, key: &str) -> Result<(), PlatformError>;
}

pub struct DiscourseClient {
    client: Client,
    base_url: String,
    api_username: String,
    api_key: SecretString,
}

impl DiscourseClient {
    pub fn new(config: &DiscourseConfig) -> Result<Self, PlatformError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_username: config.api_username.clone(),
            api_key: SecretString::from(config.api_key.clone()),
        })
    }

    fn request(&self, method: Method, path: &str, credential: &Credential) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");
        match credential {
            Credential::Bridge => builder
                .header("Api-Key", self.api_key.expose_secret())
                .header("Api-Username", &self.api_username),
            Credential::User(key) => builder.header("User-Api-Key", key),
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, PlatformError> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::from_body(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        &body,
    ))
}

/// Maps a topic-list cursor onto its JSON endpoint, e.g.
/// `/latest?page=1` becomes `/latest.json?page=1`.
pub fn topic_list_path(cursor: &str) -> String {
    let cursor = if cursor.starts_with('/') {
        cursor.to_string()
    } else {
        format!("/{cursor}")
    };
    match cursor.split_once('?') {
        Some((path, query)) if !path.ends_with(".json") => format!("{path}.json?{query}"),
        None if !cursor.ends_with(".json") => format!("{cursor}.json"),
        _ => cursor,
    }
}

#[async_trait]
impl ForumApi for DiscourseClient {
    async fn create_post(
        &self,
        credential: &Credential,
        post: &NewPost,
    ) -> Result<CreatedPost, PlatformError> {
        let created: CreatedPost = self
            .send(self.request(Method::POST, "/posts.json", credential).json(post))
            .await?;
        debug!(post_id = created.id, topic_id = created.topic_id, "Created forum post");
        Ok(created)
    }

    async fn update_post(
        &self,
        credential: &Credential,
        post_id: i64,
        raw: &str,
    ) -> Result<(), PlatformError> {
        let builder = self
            .request(Method::PUT, &format!("/posts/{post_id}.json"), credential)
            .json(&json!({ "post": { "raw": raw } }));
        check(builder.send().await?).await?;
        Ok(())
    }

    async fn send_chat_message(
        &self,
        credential: &Credential,
        channel_id: i64,
        message: &str,
        in_reply_to: Option<i64>,
    ) -> Result<i64, PlatformError> {
        let mut payload = json!({ "message": message });
        if let Some(reply) = in_reply_to {
            payload["in_reply_to_id"] = json!(reply);
        }
        let sent: SentChatMessage = self
            .send(
                self.request(
                    Method::POST,
                    &format!("/chat/api/channels/{channel_id}/messages"),
                    credential,
                )
                .json(&payload),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_chat_message(
        &self,
        credential: &Credential,
        channel_id: i64,
        message_id: i64,
        message: &str,
    ) -> Result<(), PlatformError> {
        let builder = self
            .request(
                Method::PUT,
                &format!("/chat/api/channels/{channel_id}/messages/{message_id}"),
                credential,
            )
            .json(&json!({ "message": message }));
        check(builder.send().await?).await?;
        Ok(())
    }

    async fn latest_topics(&self, cursor: &str) -> Result<TopicPage, PlatformError> {
        let latest: LatestResponse = self
            .send(self.request(Method::GET, &topic_list_path(cursor), &Credential::Bridge))
            .await?;
        Ok(latest.topic_list)
    }

    async fn topic_recent_posts(&self, topic_id: i64) -> Result<TopicPosts, PlatformError> {
        self.send(self.request(
            Method::GET,
            &format!("/t/{topic_id}/last.json"),
            &Credential::Bridge,
        ))
        .await
    }

    async fn revoke_user_api_key(&self, key: &str) -> Result<(), PlatformError> {
        let builder = self.request(
            Method::POST,
            "/user-api-key/revoke",
            &Credential::User(key.to_string()),
        );
        check(builder.send().await?).await?;
        Ok(())
    }
}
