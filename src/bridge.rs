use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::auth::AuthHandshake;
use crate::config::Config;
use crate::db::CorrelationStore;
use crate::discourse::ForumApi;
use crate::error::error_summary;
use crate::telegram::{SendOptions, TelegramApi, TelegramClient, Update};
use crate::web::metrics::Metrics;

pub mod logic;
pub mod message_flow;
pub mod settings;
pub mod telegram_flow;

#[cfg(test)]
pub(crate) mod testing;

pub use self::settings::{Author, BotSettings};

const LONG_POLL_SECS: u64 = 30;

/// Which of the two Telegram bots an update was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotRole {
    /// Pushes forum posts, answers commands and runs the login flow.
    Post,
    /// Mirrors the forum chat channel.
    Sync,
}

pub struct BridgeCore {
    post_bot: Arc<dyn TelegramApi>,
    sync_bot: Arc<dyn TelegramApi>,
    forum: Arc<dyn ForumApi>,
    store: CorrelationStore,
    auth: Arc<AuthHandshake>,
    settings: BotSettings,
    config: Arc<Config>,
}

impl BridgeCore {
    pub fn new(
        config: Arc<Config>,
        post_bot: Arc<dyn TelegramApi>,
        sync_bot: Arc<dyn TelegramApi>,
        forum: Arc<dyn ForumApi>,
        store: CorrelationStore,
        auth: Arc<AuthHandshake>,
    ) -> Self {
        Self {
            settings: BotSettings::new(&config.bridge),
            post_bot,
            sync_bot,
            forum,
            store,
            auth,
            config,
        }
    }

    #[cfg(test)]
    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    fn group_id(&self) -> i64 {
        self.config.telegram.group_id
    }

    fn channel_id(&self) -> i64 {
        self.config.discourse.channel_id
    }

    fn bot(&self, role: BotRole) -> &dyn TelegramApi {
        match role {
            BotRole::Post => self.post_bot.as_ref(),
            BotRole::Sync => self.sync_bot.as_ref(),
        }
    }

    pub async fn handle_update(&self, role: BotRole, update: Update) -> Result<()> {
        debug!(
            ?role,
            update_id = update.update_id,
            message = update.message.is_some(),
            edited = update.edited_message.is_some(),
            join_request = update.chat_join_request.is_some(),
            "Telegram update received"
        );
        match role {
            BotRole::Post => {
                if let Some(request) = update.chat_join_request {
                    return self.handle_join_request(request).await;
                }
                if let Some(message) = update.message {
                    self.handle_post_bot_message(message).await;
                }
            }
            BotRole::Sync => {
                if let Some(message) = update.edited_message {
                    self.handle_edited_message(message).await;
                } else if let Some(message) = update.message {
                    self.handle_sync_bot_message(message).await;
                }
            }
        }
        Ok(())
    }

    /// Finishes a login from the forum's authorization redirect and runs a
    /// pending join verification for the user.
    pub async fn complete_login(&self, payload: &str) -> Result<()> {
        let pending = self.auth.complete(payload)?;
        self.post_bot
            .send_text(
                pending.chat_id,
                "Logged in to the forum.",
                &SendOptions::default(),
            )
            .await?;
        if let Some(request) = self.store.join_request(pending.chat_id) {
            self.verify_join(&request).await;
        }
        Ok(())
    }

    /// Relays a failure back to the chat the triggering message came from.
    async fn reply_error(
        &self,
        role: BotRole,
        chat_id: i64,
        reply_to: Option<i64>,
        err: &anyhow::Error,
    ) {
        Metrics::outbound_failed();
        let summary = error_summary(err);
        warn!(?role, chat_id, "Relaying failure to sender: {summary}");
        if let Err(send_err) = self
            .bot(role)
            .send_text(chat_id, &summary, &SendOptions::default().reply_to(reply_to))
            .await
        {
            error!(?role, chat_id, "Failed to relay error to sender: {send_err}");
        }
    }

    async fn notify(&self, role: BotRole, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64> {
        let id = self
            .bot(role)
            .send_text(chat_id, text, &SendOptions::default().reply_to(reply_to))
            .await?;
        Ok(id)
    }

    /// Long-polls one bot forever, handling each update in its own task.
    pub async fn run_poller(self: Arc<Self>, client: Arc<TelegramClient>, role: BotRole) {
        let retry = Duration::from_millis(self.config.telegram.poll_interval_ms);
        let mut offset = 0;
        info!(?role, "Telegram polling started");
        loop {
            let updates = match client.get_updates(offset, LONG_POLL_SECS).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(?role, "Failed to poll Telegram updates: {err}");
                    tokio::time::sleep(retry).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                Metrics::telegram_update_received();
                let bridge = self.clone();
                tokio::spawn(async move {
                    let update_id = update.update_id;
                    if let Err(err) = bridge.handle_update(role, update).await {
                        error!(?role, update_id, "Failed to handle update: {}", error_summary(&err));
                    }
                });
            }
        }
    }
}
