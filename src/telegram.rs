use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::PlatformError;

pub use self::types::{ChatJoinRequest, Message, Update, User};

pub mod types;

use self::types::{ApiResponse, File, SentMessage};

/// Telegram caps media groups at this many items.
pub const MEDIA_GROUP_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to: Option<i64>,
    /// Send with HTML parse mode.
    pub html: bool,
    pub disable_preview: bool,
}

impl SendOptions {
    pub fn html() -> Self {
        Self {
            html: true,
            ..Self::default()
        }
    }

    pub fn reply_to(mut self, message_id: Option<i64>) -> Self {
        self.reply_to = message_id;
        self
    }

    pub fn without_preview(mut self) -> Self {
        self.disable_preview = true;
        self
    }
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<i64, PlatformError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: Option<&str>,
        options: &SendOptions,
    ) -> Result<i64, PlatformError>;

    /// Sends up to [`MEDIA_GROUP_LIMIT`] photos as one album and returns the
    /// id of every message in it.
    async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        options: &SendOptions,
    ) -> Result<Vec<i64>, PlatformError>;

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), PlatformError>;

    async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), PlatformError>;

    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError>;

    /// Download URL of a file. The URL embeds the bot token.
    async fn file_link(&self, file_id: &str) -> Result<String, PlatformError>;
}

pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: SecretString,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: String) -> Result<Self, PlatformError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: SecretString::from(token),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T, PlatformError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;
        if !body.ok {
            let code = body.error_code.unwrap_or(status.as_u16());
            let reason = reqwest::StatusCode::from_u16(code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Telegram error");
            return Err(PlatformError::api(
                code,
                reason,
                body.description.into_iter().collect(),
            ));
        }

        body.result
            .ok_or_else(|| PlatformError::Decode(format!("{method} response missing result")))
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, PlatformError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "edited_message", "chat_join_request"],
        });
        self.call("getUpdates", &payload).await
    }
}

fn apply_options(payload: &mut Value, options: &SendOptions) {
    if options.html {
        payload["parse_mode"] = Value::String("HTML".into());
    }
    if let Some(reply_to) = options.reply_to {
        payload["reply_parameters"] = json!({
            "message_id": reply_to,
            "allow_sending_without_reply": true,
        });
    }
    if options.disable_preview {
        payload["link_preview_options"] = json!({ "is_disabled": true });
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<i64, PlatformError> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        apply_options(&mut payload, options);
        let sent: SentMessage = self.call("sendMessage", &payload).await?;
        debug!(chat_id, message_id = sent.message_id, "Sent Telegram message");
        Ok(sent.message_id)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: Option<&str>,
        options: &SendOptions,
    ) -> Result<i64, PlatformError> {
        let mut payload = json!({ "chat_id": chat_id, "photo": photo });
        if let Some(caption) = caption {
            payload["caption"] = Value::String(caption.to_string());
        }
        apply_options(&mut payload, options);
        let sent: SentMessage = self.call("sendPhoto", &payload).await?;
        Ok(sent.message_id)
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        options: &SendOptions,
    ) -> Result<Vec<i64>, PlatformError> {
        let media: Vec<Value> = photos
            .iter()
            .take(MEDIA_GROUP_LIMIT)
            .map(|url| json!({ "type": "photo", "media": url }))
            .collect();
        let mut payload = json!({ "chat_id": chat_id, "media": media });
        if let Some(reply_to) = options.reply_to {
            payload["reply_parameters"] = json!({
                "message_id": reply_to,
                "allow_sending_without_reply": true,
            });
        }
        let sent: Vec<SentMessage> = self.call("sendMediaGroup", &payload).await?;
        Ok(sent.into_iter().map(|m| m.message_id).collect())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), PlatformError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        apply_options(&mut payload, &SendOptions {
            reply_to: None,
            ..options.clone()
        });
        // Inline edits answer `true` instead of the message.
        let _: Value = self.call("editMessageText", &payload).await?;
        Ok(())
    }

    async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
    ) -> Result<(), PlatformError> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "caption": caption,
            "parse_mode": "HTML",
        });
        let _: Value = self.call("editMessageCaption", &payload).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), PlatformError> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call("deleteMessage", &payload).await?;
        Ok(())
    }

    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError> {
        let payload = json!({ "chat_id": chat_id, "user_id": user_id });
        let _: bool = self.call("approveChatJoinRequest", &payload).await?;
        Ok(())
    }

    async fn file_link(&self, file_id: &str) -> Result<String, PlatformError> {
        let file: File = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let path = file
            .file_path
            .ok_or_else(|| PlatformError::Decode(format!("file {} has no path", file.file_id)))?;
        Ok(format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            path
        ))
    }
}
