//! Telegram to forum: replies, commands, join requests and the chat mirror.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::logic::{
    JOIN_VERIFICATION_MESSAGE, NO_TEXT_NOTICE, RenderPath, SHUT_UP, SOURCE_NOT_FOUND_NOTICE,
    VIDEO_NOTICE, attribution, join_request_notice, needs_header, photo_markdown,
    recent_posts_message, sticker_markdown, sticker_needs_link, toggle_notice,
    topic_list_message,
};
use super::{Author, BotRole, BridgeCore};
use crate::auth::LogoutOutcome;
use crate::db::{ChatLink, JoinRequestRecord, MessageKind, MessageLink};
use crate::discourse::{Credential, NewPost};
use crate::error::{PlatformError, error_summary};
use crate::parsers::{ParsedCommand, parse_command};
use crate::telegram::{ChatJoinRequest, Message, SendOptions, User};
use crate::utils::formatting::preview_text;

const WELCOME_MESSAGE: &str = "Welcome! To keep spam out, this group requires a linked forum account.\n\n\
Send me /login to sign in to your forum account and I will approve your request automatically. \
Or reply with your forum username (or why you want to join) and I will pass it on to the admins.";

impl BridgeCore {
    pub(super) async fn handle_post_bot_message(&self, message: Message) {
        let Some(from) = message.from.clone() else {
            return;
        };
        if let Err(err) = self.process_post_bot_message(&message, &from).await {
            self.reply_error(
                BotRole::Post,
                message.chat.id,
                Some(message.message_id),
                &err,
            )
            .await;
        }
    }

    async fn process_post_bot_message(&self, message: &Message, from: &User) -> Result<()> {
        let chat_id = message.chat.id;
        let command = parse_command(
            message.body(),
            Some(self.config.telegram.post_bot_username.as_str()),
        );

        if message.is_private() && command.is_none() {
            if let Some(request) = self.store.join_request(chat_id) {
                return self.forward_join_message(&request, message).await;
            }
        }
        if let Some(command) = command {
            return self.handle_post_command(command, message, from).await;
        }
        if chat_id != self.group_id() {
            return Ok(());
        }

        let Some(replied) = message.reply_to_message.as_deref() else {
            return Ok(());
        };
        match self.store.post_link(replied.message_id) {
            Some(link) if self.settings.push_posts() => self.forward_reply(message, from, link).await,
            _ => {
                if message.body().trim() == SHUT_UP {
                    self.settings.set_muted(true);
                }
                let own = self.config.telegram.post_bot_username.as_str();
                let replied_to_bot = replied
                    .from
                    .as_ref()
                    .and_then(|user| user.username.as_deref())
                    .is_some_and(|name| !own.is_empty() && name.eq_ignore_ascii_case(own));
                if replied_to_bot && !self.settings.muted() {
                    self.notify(
                        BotRole::Post,
                        chat_id,
                        SOURCE_NOT_FOUND_NOTICE,
                        Some(message.message_id),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    async fn handle_post_command(
        &self,
        command: ParsedCommand,
        message: &Message,
        from: &User,
    ) -> Result<()> {
        let chat_id = message.chat.id;
        let in_group = chat_id == self.group_id();
        debug!(chat_id, ?command, "post bot command");

        match command {
            ParsedCommand::Id => {
                self.notify(BotRole::Post, chat_id, &format!("chat id is {chat_id}"), None)
                    .await?;
            }
            ParsedCommand::Speak => {
                self.settings.set_muted(false);
                self.notify(BotRole::Post, chat_id, "I'm back!", None).await?;
            }
            ParsedCommand::Login | ParsedCommand::Logout if !message.is_private() => {
                self.notify(BotRole::Post, chat_id, "Please message me privately.", None)
                    .await?;
            }
            ParsedCommand::Login => self.begin_login(from.id, chat_id).await?,
            ParsedCommand::Logout => self.logout(from.id, chat_id).await?,
            ParsedCommand::TogglePush if !in_group => {
                self.notify(
                    BotRole::Post,
                    chat_id,
                    "This command only works in the bridged group.",
                    None,
                )
                .await?;
            }
            ParsedCommand::TogglePush => {
                let enabled = self.settings.toggle_push_posts();
                self.notify(BotRole::Post, chat_id, &toggle_notice("forum post push", enabled), None)
                    .await?;
            }
            _ if !in_group => {}
            ParsedCommand::Latest => {
                self.settings.rewind_topic_cursor();
                self.list_topics(chat_id).await?;
            }
            ParsedCommand::Next => self.list_topics(chat_id).await?,
            ParsedCommand::ReplyTo { topic_id, body: None } => {
                self.prompt_topic_reply(message, topic_id).await?;
            }
            ParsedCommand::ReplyTo {
                topic_id,
                body: Some(body),
            } => {
                let link = MessageLink {
                    topic_id,
                    post_number: None,
                };
                self.store.link_post(message.message_id, link);
                let inline = Message {
                    text: Some(body),
                    caption: None,
                    ..message.clone()
                };
                self.forward_reply(&inline, from, link).await?;
            }
            ParsedCommand::MalformedReplyTo => {
                self.notify(
                    BotRole::Post,
                    chat_id,
                    "Wrong command format.",
                    Some(message.message_id),
                )
                .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn list_topics(&self, chat_id: i64) -> Result<()> {
        let page = self
            .forum
            .latest_topics(&self.settings.topic_cursor())
            .await?;
        self.settings.set_topic_cursor(page.more_topics_url.clone());
        let text = topic_list_message(&page.topics, &self.config.discourse.topic_categories);
        self.notify(BotRole::Post, chat_id, &text, None).await?;
        Ok(())
    }

    async fn prompt_topic_reply(&self, message: &Message, topic_id: i64) -> Result<()> {
        let topic = self.forum.topic_recent_posts(topic_id).await?;
        let text = recent_posts_message(
            self.config.forum_url(),
            topic_id,
            &topic.title,
            &topic.post_stream.posts,
            self.config.bridge.max_post_length,
        );
        let prompt_id = self
            .post_bot
            .send_text(
                message.chat.id,
                &text,
                &SendOptions::html()
                    .reply_to(Some(message.message_id))
                    .without_preview(),
            )
            .await?;
        self.store.link_post(
            prompt_id,
            MessageLink {
                topic_id,
                post_number: None,
            },
        );
        Ok(())
    }

    /// Posts a Telegram reply into the forum topic `link` points at.
    async fn forward_reply(&self, message: &Message, from: &User, link: MessageLink) -> Result<()> {
        let text = self
            .render_telegram(BotRole::Post, message, RenderPath::Post)
            .await?;
        if text.is_empty() {
            self.notify(
                BotRole::Post,
                message.chat.id,
                NO_TEXT_NOTICE,
                Some(message.message_id),
            )
            .await?;
            return Ok(());
        }

        let credential = self.auth.credential_for(from.id);
        let raw = self.attributed(&credential, from, text, RenderPath::Post);
        let created = self
            .forum
            .create_post(
                &credential,
                &NewPost {
                    topic_id: link.topic_id,
                    reply_to_post_number: link.post_number,
                    raw,
                },
            )
            .await?;
        self.store
            .link_forwarded_post(message.message_id, created.id);
        debug!(
            message_id = message.message_id,
            post_id = created.id,
            topic_id = created.topic_id,
            "Forwarded Telegram reply"
        );
        Ok(())
    }

    async fn forward_join_message(&self, request: &JoinRequestRecord, message: &Message) -> Result<()> {
        let notice = join_request_notice(&request.display_name, message.body());
        self.notify(BotRole::Post, self.group_id(), &notice, None)
            .await?;
        self.notify(
            BotRole::Post,
            message.chat.id,
            "Got it. Please wait for an admin to review your request.",
            None,
        )
        .await?;
        Ok(())
    }

    pub(super) async fn handle_join_request(&self, request: ChatJoinRequest) -> anyhow::Result<()> {
        if request.chat.id != self.group_id() {
            return Ok(());
        }
        let record = JoinRequestRecord {
            user_id: request.from.id,
            user_chat_id: request.user_chat_id,
            display_name: request.from.mention(),
            requested_at: Utc::now(),
        };
        self.store.record_join_request(&record);
        info!(user_id = record.user_id, "Recorded join request");

        // The requester may have blocked the bot; the request stands regardless.
        if let Err(err) = self
            .notify(BotRole::Post, record.user_chat_id, WELCOME_MESSAGE, None)
            .await
        {
            warn!(user_id = record.user_id, "Failed to send join welcome: {}", error_summary(&err));
        }

        if self.auth.is_bound(record.user_id) {
            if let Err(err) = self
                .notify(
                    BotRole::Post,
                    record.user_chat_id,
                    "You are logged in! Verifying your identity...",
                    None,
                )
                .await
            {
                warn!(user_id = record.user_id, "Failed to announce verification: {}", error_summary(&err));
            }
            self.verify_join(&record).await;
        }
        Ok(())
    }

    /// Posts a verification chat message as the requester and approves the
    /// join request once it succeeds. Failures are reported to the requester.
    pub(super) async fn verify_join(&self, request: &JoinRequestRecord) {
        let credential = self.auth.credential_for(request.user_id);
        if credential == Credential::Bridge {
            return;
        }

        let verified: Result<(), PlatformError> = async {
            let message_id = self
                .forum
                .send_chat_message(&credential, self.channel_id(), JOIN_VERIFICATION_MESSAGE, None)
                .await?;
            self.store.mark_suppressed(message_id);
            self.post_bot
                .approve_join_request(self.group_id(), request.user_id)
                .await
        }
        .await;

        match verified {
            Ok(()) => info!(user_id = request.user_id, "Approved join request"),
            Err(err) => {
                warn!(user_id = request.user_id, "Join verification failed: {err}");
                let text = format!("Identity verification failed: {}", err.summary());
                if let Err(err) = self
                    .notify(BotRole::Post, request.user_chat_id, &text, None)
                    .await
                {
                    warn!(user_id = request.user_id, "Failed to report verification failure: {err}");
                }
            }
        }
    }

    async fn begin_login(&self, uid: i64, chat_id: i64) -> Result<()> {
        if self.auth.is_bound(uid) {
            match self.store.join_request(chat_id) {
                Some(request) => {
                    self.notify(
                        BotRole::Post,
                        chat_id,
                        "You are logged in! Verifying your identity...",
                        None,
                    )
                    .await?;
                    self.verify_join(&request).await;
                }
                None => {
                    self.notify(
                        BotRole::Post,
                        chat_id,
                        "You are already logged in! Send /logout to log out.",
                        None,
                    )
                    .await?;
                }
            }
            return Ok(());
        }

        let request = self.auth.begin(uid, chat_id)?;
        self.post_bot
            .send_text(
                chat_id,
                &format!(
                    "Open this link to let the bot sign in to your forum account:\n{}",
                    request.url
                ),
                &SendOptions::default().without_preview(),
            )
            .await?;
        Ok(())
    }

    async fn logout(&self, uid: i64, chat_id: i64) -> Result<()> {
        let text = match self.auth.logout(uid, self.forum.as_ref()).await {
            LogoutOutcome::NotLoggedIn | LogoutOutcome::Revoked => "Login token cleared.".to_string(),
            LogoutOutcome::RevokeFailed(err) => format!(
                "Login token cleared, but revoking it on the forum failed: {}",
                err.summary()
            ),
        };
        self.notify(BotRole::Post, chat_id, &text, None).await?;
        Ok(())
    }

    pub(super) async fn handle_sync_bot_message(&self, message: Message) {
        let Some(from) = message.from.clone() else {
            return;
        };
        let conversation = self.channel_id();

        if message.body().starts_with('/') {
            self.settings.reset_last_author(conversation);
            let command = parse_command(
                message.body(),
                Some(self.config.telegram.sync_bot_username.as_str()),
            );
            if let Some(command) = command {
                if let Err(err) = self.handle_sync_command(command, message.chat.id).await {
                    self.reply_error(BotRole::Sync, message.chat.id, Some(message.message_id), &err)
                        .await;
                }
            }
            return;
        }
        if !self.settings.sync_chat() {
            self.settings.reset_last_author(conversation);
            return;
        }
        let own = self.config.telegram.sync_bot_username.as_str();
        let replied_to_other_bot = message
            .reply_to_message
            .as_ref()
            .and_then(|replied| replied.from.as_ref())
            .is_some_and(|user| {
                user.is_bot
                    && !user
                        .username
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(own))
            });
        if replied_to_other_bot {
            self.settings.reset_last_author(conversation);
            return;
        }
        if message.chat.id != self.group_id() {
            return;
        }

        if let Err(err) = self.forward_chat_message(&message, &from).await {
            self.reply_error(BotRole::Sync, message.chat.id, Some(message.message_id), &err)
                .await;
        }
    }

    async fn handle_sync_command(&self, command: ParsedCommand, chat_id: i64) -> Result<()> {
        let text = match command {
            ParsedCommand::ToggleSync => toggle_notice("chat sync", self.settings.toggle_sync_chat()),
            ParsedCommand::SyncOn => {
                self.settings.set_sync_chat(true);
                toggle_notice("chat sync", true)
            }
            ParsedCommand::SyncOff => {
                self.settings.set_sync_chat(false);
                toggle_notice("chat sync", false)
            }
            ParsedCommand::IsSync => format!(
                "Chat sync is {}.",
                if self.settings.sync_chat() { "on" } else { "off" }
            ),
            _ => return Ok(()),
        };
        self.notify(BotRole::Sync, chat_id, &text, None).await?;
        Ok(())
    }

    async fn forward_chat_message(&self, message: &Message, from: &User) -> Result<()> {
        let text = self
            .render_telegram(BotRole::Sync, message, RenderPath::Chat)
            .await?;
        if text.is_empty() {
            return Ok(());
        }

        let conversation = self.channel_id();
        let author = Author::Telegram(from.id);
        let credential = self.auth.credential_for(from.id);
        let has_header = credential == Credential::Bridge
            && needs_header(
                self.settings.last_author(conversation).as_ref(),
                &author,
                message.reply_to_message.is_some(),
            );
        let raw = if has_header {
            format!("{}{text}", attribution(from.display_name(), RenderPath::Chat))
        } else {
            text
        };
        let in_reply_to = message
            .reply_to_message
            .as_ref()
            .and_then(|replied| self.store.chat_by_telegram(replied.message_id))
            .map(|link| link.forum_message_id);

        let forum_message_id = self
            .forum
            .send_chat_message(&credential, self.channel_id(), &raw, in_reply_to)
            .await?;
        self.store.mark_suppressed(forum_message_id);
        self.settings.set_last_author(conversation, author);
        self.store.link_chat(ChatLink {
            telegram_message_id: message.message_id,
            forum_message_id,
            has_header,
            kind: MessageKind::Text,
        });
        debug!(
            message_id = message.message_id,
            forum_message_id,
            has_header,
            preview = %preview_text(&raw),
            "Mirrored Telegram message to chat"
        );
        Ok(())
    }

    pub(super) async fn handle_edited_message(&self, message: Message) {
        let Some(from) = message.from.clone() else {
            return;
        };

        if let Some(post_id) = self.store.forwarded_post(message.message_id) {
            if let Err(err) = self.update_forwarded_post(&message, &from, post_id).await {
                self.reply_error(BotRole::Post, message.chat.id, Some(message.message_id), &err)
                    .await;
            }
            return;
        }
        if let Some(link) = self.store.chat_by_telegram(message.message_id) {
            if let Err(err) = self.update_chat_message(&message, &from, link).await {
                self.reply_error(BotRole::Sync, message.chat.id, Some(message.message_id), &err)
                    .await;
            }
        }
    }

    async fn update_forwarded_post(&self, message: &Message, from: &User, post_id: i64) -> Result<()> {
        let inline = self.inline_reply_body(message);
        let text = self
            .render_telegram(BotRole::Sync, inline.as_ref().unwrap_or(message), RenderPath::Post)
            .await?;
        if text.is_empty() {
            self.notify(
                BotRole::Post,
                message.chat.id,
                NO_TEXT_NOTICE,
                Some(message.message_id),
            )
            .await?;
            return Ok(());
        }
        let credential = self.auth.credential_for(from.id);
        let raw = self.attributed(&credential, from, text, RenderPath::Post);
        self.forum.update_post(&credential, post_id, &raw).await?;
        debug!(message_id = message.message_id, post_id, "Updated forwarded post");
        Ok(())
    }

    async fn update_chat_message(&self, message: &Message, from: &User, link: ChatLink) -> Result<()> {
        let text = self
            .render_telegram(BotRole::Sync, message, RenderPath::Chat)
            .await?;
        if text.is_empty() {
            return Ok(());
        }
        let raw = if link.has_header {
            format!("{}{text}", attribution(from.display_name(), RenderPath::Chat))
        } else {
            text
        };
        let credential = self.auth.credential_for(from.id);

        self.store.mark_suppressed(link.forum_message_id);
        if let Err(err) = self
            .forum
            .edit_chat_message(&credential, self.channel_id(), link.forum_message_id, &raw)
            .await
        {
            self.store.take_suppressed(link.forum_message_id);
            return Err(err.into());
        }
        Ok(())
    }

    /// The message with its `/replyto_<id>` prefix removed, when it is an
    /// inline topic reply.
    fn inline_reply_body(&self, message: &Message) -> Option<Message> {
        let command = parse_command(
            message.body(),
            Some(self.config.telegram.post_bot_username.as_str()),
        )?;
        match command {
            ParsedCommand::ReplyTo {
                body: Some(body), ..
            } => Some(Message {
                text: Some(body),
                caption: None,
                ..message.clone()
            }),
            _ => None,
        }
    }

    fn attributed(&self, credential: &Credential, from: &User, text: String, path: RenderPath) -> String {
        match credential {
            Credential::User(_) => text,
            Credential::Bridge => format!("{}{text}", attribution(from.display_name(), path)),
        }
    }

    /// Renders text or caption plus attachments as forum markdown.
    async fn render_telegram(&self, role: BotRole, message: &Message, path: RenderPath) -> Result<String> {
        let bot = self.bot(role);
        let mut text = message.body().to_string();

        if let Some(sticker) = &message.sticker {
            let link = if sticker_needs_link(sticker) {
                Some(bot.file_link(&sticker.file_id).await?)
            } else {
                None
            };
            text.push_str(&sticker_markdown(sticker, link.as_deref(), path));
        }
        let largest = message.photo.as_ref().and_then(|sizes| {
            sizes
                .iter()
                .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
        });
        if let Some(photo) = largest {
            let link = bot.file_link(&photo.file_id).await?;
            text.push_str(&photo_markdown(&link));
        }
        if message.video.is_some() {
            text.push_str(VIDEO_NOTICE);
        }
        Ok(text.trim().to_string())
    }
}
