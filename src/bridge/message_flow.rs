//! Forum to Telegram: post pushes by the post bot and the chat mirror run
//! by the sync bot.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use super::logic::{MediaPlan, body_budget, chat_header, needs_header, plan_media, post_header};
use super::{Author, BotRole, BridgeCore};
use crate::db::{ChatLink, MessageKind, MessageLink, MirrorState, MirroredMessage};
use crate::discourse::{ChatWebhook, ForumEvent, PostPayload, PostWebhook};
use crate::error::PlatformError;
use crate::parsers::{CookedOptions, extract_image_sources, normalize_url, render_cooked};
use crate::telegram::SendOptions;
use crate::utils::formatting::preview_text;
use crate::web::metrics::Metrics;

/// Messages produced by one delivered [`MediaPlan`].
struct Delivered {
    primary: MirroredMessage,
    album_ids: Vec<i64>,
}

impl BridgeCore {
    pub async fn handle_post_event(&self, event: ForumEvent, webhook: PostWebhook) -> Result<()> {
        let post = webhook.post;
        match event {
            ForumEvent::PostCreated | ForumEvent::PostEdited => self.mirror_post(&post).await,
            ForumEvent::PostDestroyed => self.delete_post_mirror(post.id).await,
            _ => Ok(()),
        }
    }

    pub async fn handle_chat_event(&self, event: ForumEvent, webhook: ChatWebhook) -> Result<()> {
        let message = &webhook.message;
        if !self.settings.sync_chat() {
            debug!(message_id = message.id, "chat event dropped reason=sync_off");
            return Ok(());
        }
        if webhook.channel.slug != self.config.discourse.sync_channel_slug {
            debug!(
                message_id = message.id,
                channel = %webhook.channel.slug,
                "chat event dropped reason=unsynced_channel"
            );
            return Ok(());
        }

        // Markers for our own writes are set once the write returns.
        tokio::time::sleep(Duration::from_millis(self.config.bridge.echo_settle_ms)).await;
        if self.store.take_suppressed(message.id) {
            Metrics::echo_suppressed();
            debug!(message_id = message.id, "chat event dropped reason=own_echo");
            return Ok(());
        }

        let own_account = &self.config.discourse.bot_username;
        if !own_account.is_empty() && message.user.username.eq_ignore_ascii_case(own_account) {
            debug!(message_id = message.id, "chat event dropped reason=bridge_author");
            return Ok(());
        }

        if event == ForumEvent::ChatMessageTrashed || message.deleted_at.is_some() {
            return self.delete_chat_mirror(message.id).await;
        }
        self.mirror_chat_message(&webhook).await
    }

    async fn mirror_post(&self, post: &PostPayload) -> Result<()> {
        if !self.settings.push_posts() {
            debug!(post_id = post.id, "post event dropped reason=push_off");
            return Ok(());
        }

        let forum_url = self.config.forum_url();
        let header = post_header(
            forum_url,
            &post.username,
            post.topic_id,
            post.post_number,
            &post.topic_title,
        );
        let options = SendOptions::html().without_preview();

        if let MirrorState::Mirrored(mirrored) = self.store.post_mirror(post.id) {
            let body = self.render_body(&post.cooked, true, self.limit_for(mirrored.kind), &header);
            self.edit_mirrored(BotRole::Post, mirrored, &format!("{header}{body}"), &options)
                .await?;
            debug!(post_id = post.id, message_id = mirrored.message_id, "Updated mirrored post");
            return Ok(());
        }

        let images = extract_image_sources(&post.cooked, true, Some(forum_url));
        let body = self.render_body(&post.cooked, true, self.limit_for_images(images.len()), &header);
        if body.is_empty() && images.is_empty() {
            debug!(post_id = post.id, "post event dropped reason=empty");
            return Ok(());
        }

        let plan = plan_media(format!("{header}{body}"), images);
        let delivered = self.deliver(BotRole::Post, &plan, &options).await?;
        let link = MessageLink {
            topic_id: post.topic_id,
            post_number: post.post_number,
        };
        self.store.record_post_mirror(post.id, delivered.primary, link);
        for message_id in delivered.album_ids {
            self.store.link_post(message_id, link);
        }
        debug!(
            post_id = post.id,
            message_id = delivered.primary.message_id,
            preview = %preview_text(&body),
            "Mirrored forum post"
        );
        Ok(())
    }

    async fn delete_post_mirror(&self, post_id: i64) -> Result<()> {
        match self.store.forget_post_mirror(post_id) {
            MirrorState::Mirrored(mirrored) => {
                self.post_bot
                    .delete_message(self.group_id(), mirrored.message_id)
                    .await?;
                debug!(post_id, message_id = mirrored.message_id, "Deleted mirrored post");
            }
            MirrorState::Unmirrored => {
                debug!(post_id, "post delete ignored reason=unmirrored");
            }
        }
        Ok(())
    }

    async fn mirror_chat_message(&self, webhook: &ChatWebhook) -> Result<()> {
        let message = &webhook.message;
        let conversation = webhook.channel.id.unwrap_or(self.channel_id());
        let author = Author::Forum(message.user.username.clone());
        let state = self.store.chat_mirror(message.id);

        let has_header = match state {
            MirrorState::Mirrored(link) => link.has_header,
            MirrorState::Unmirrored => needs_header(
                self.settings.last_author(conversation).as_ref(),
                &author,
                message.in_reply_to.is_some(),
            ),
        };
        self.settings.set_last_author(conversation, author);
        let header = if has_header {
            chat_header(&message.user.username)
        } else {
            String::new()
        };

        if let MirrorState::Mirrored(link) = state {
            let body = self.render_body(&message.cooked, false, self.limit_for(link.kind), &header);
            let mirrored = MirroredMessage {
                message_id: link.telegram_message_id,
                kind: link.kind,
            };
            self.edit_mirrored(BotRole::Sync, mirrored, &format!("{header}{body}"), &SendOptions::html())
                .await?;
            debug!(message_id = message.id, "Updated mirrored chat message");
            return Ok(());
        }

        let forum_url = self.config.forum_url();
        let mut images = extract_image_sources(&message.cooked, false, Some(forum_url));
        for upload in &message.uploads {
            if let Some(url) = normalize_url(&upload.url, Some(forum_url)) {
                if !images.contains(&url) {
                    images.push(url);
                }
            }
        }

        let body = self.render_body(&message.cooked, false, self.limit_for_images(images.len()), &header);
        if body.is_empty() && images.is_empty() {
            debug!(message_id = message.id, "chat event dropped reason=empty");
            return Ok(());
        }

        let reply_to = message
            .in_reply_to
            .as_ref()
            .and_then(|parent| self.store.chat_mirror(parent.id).mirrored())
            .map(|parent| parent.telegram_message_id);
        let plan = plan_media(format!("{header}{body}"), images);
        let delivered = self
            .deliver(BotRole::Sync, &plan, &SendOptions::html().reply_to(reply_to))
            .await?;

        let link = ChatLink {
            telegram_message_id: delivered.primary.message_id,
            forum_message_id: message.id,
            has_header,
            kind: delivered.primary.kind,
        };
        self.store.link_chat(link);
        for message_id in delivered.album_ids {
            self.store.alias_chat(message_id, &link);
        }
        debug!(
            message_id = message.id,
            telegram_message_id = link.telegram_message_id,
            has_header,
            "Mirrored chat message"
        );
        Ok(())
    }

    async fn delete_chat_mirror(&self, forum_message_id: i64) -> Result<()> {
        if let Some(link) = self.store.chat_mirror(forum_message_id).mirrored() {
            self.sync_bot
                .delete_message(self.group_id(), link.telegram_message_id)
                .await?;
            debug!(forum_message_id, "Deleted mirrored chat message");
        }
        Ok(())
    }

    fn render_body(&self, cooked: &str, strip_emoji: bool, limit: usize, header: &str) -> String {
        let options = CookedOptions {
            strip_emoji,
            max_length: body_budget(limit, header),
            base_url: Some(self.config.forum_url().to_string()),
        };
        render_cooked(cooked, &options).trim().to_string()
    }

    fn limit_for(&self, kind: MessageKind) -> usize {
        match kind {
            MessageKind::Text => self.config.bridge.max_post_length,
            MessageKind::Caption => self.config.bridge.max_caption_length,
        }
    }

    fn limit_for_images(&self, count: usize) -> usize {
        if count == 1 {
            self.limit_for(MessageKind::Caption)
        } else {
            self.limit_for(MessageKind::Text)
        }
    }

    /// Edits text or caption in place; media are never re-sent.
    async fn edit_mirrored(
        &self,
        role: BotRole,
        mirrored: MirroredMessage,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), PlatformError> {
        let bot = self.bot(role);
        match mirrored.kind {
            MessageKind::Text => {
                bot.edit_text(self.group_id(), mirrored.message_id, text, options)
                    .await
            }
            MessageKind::Caption => {
                bot.edit_caption(self.group_id(), mirrored.message_id, text)
                    .await
            }
        }
    }

    async fn deliver(
        &self,
        role: BotRole,
        plan: &MediaPlan,
        options: &SendOptions,
    ) -> Result<Delivered, PlatformError> {
        let bot = self.bot(role);
        let group = self.group_id();
        match plan {
            MediaPlan::Text { text } => {
                let message_id = bot.send_text(group, text, options).await?;
                Ok(Delivered {
                    primary: MirroredMessage {
                        message_id,
                        kind: MessageKind::Text,
                    },
                    album_ids: Vec::new(),
                })
            }
            MediaPlan::Photo { photo, caption } => {
                let caption = Some(caption.as_str()).filter(|caption| !caption.is_empty());
                let message_id = bot.send_photo(group, photo, caption, options).await?;
                Ok(Delivered {
                    primary: MirroredMessage {
                        message_id,
                        kind: MessageKind::Caption,
                    },
                    album_ids: Vec::new(),
                })
            }
            MediaPlan::TextWithAlbums { text, albums } => {
                let message_id = bot.send_text(group, text, options).await?;
                let mut album_ids = Vec::new();
                for album in albums {
                    match bot
                        .send_media_group(group, album, &SendOptions::default())
                        .await
                    {
                        Ok(ids) => album_ids.extend(ids),
                        Err(err) => {
                            Metrics::outbound_failed();
                            warn!(?role, size = album.len(), "Failed to send album: {err}");
                        }
                    }
                }
                Ok(Delivered {
                    primary: MirroredMessage {
                        message_id,
                        kind: MessageKind::Text,
                    },
                    album_ids,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::testing::{Harness, TelegramCall, chat_webhook, post_webhook};
    use crate::db::{MessageKind, MessageLink, MirrorState, MirroredMessage};
    use crate::discourse::ForumEvent;

    #[tokio::test]
    async fn repeated_post_events_edit_a_single_message() {
        let harness = Harness::new();
        let bridge = &harness.bridge;

        bridge
            .handle_post_event(ForumEvent::PostCreated, post_webhook(10, "<p>first</p>"))
            .await
            .expect("create");
        for round in 0..3 {
            bridge
                .handle_post_event(
                    ForumEvent::PostEdited,
                    post_webhook(10, &format!("<p>edit {round}</p>")),
                )
                .await
                .expect("edit");
        }
        // A redelivered create must not duplicate the message either.
        bridge
            .handle_post_event(ForumEvent::PostCreated, post_webhook(10, "<p>again</p>"))
            .await
            .expect("redelivery");

        let sends = harness.post_bot.sends();
        assert_eq!(sends.len(), 1);
        let TelegramCall::SendText { text, .. } = &sends[0] else {
            panic!("expected a text message, got {sends:?}");
        };
        assert!(text.starts_with("<b>ann in <a href=\"https://forum.example.org/t/-/7/3\">Hello</a></b>\n"));
        assert!(text.ends_with("first"));

        let edits: Vec<String> = harness
            .post_bot
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TelegramCall::EditText { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(edits.len(), 4);
        assert!(edits[3].ends_with("again"));
    }

    #[tokio::test]
    async fn many_images_are_batched_into_albums() {
        let harness = Harness::new();
        let images: String = (0..23)
            .map(|i| format!("<img src=\"/uploads/default/{i}.png\">"))
            .collect();
        harness
            .bridge
            .handle_post_event(
                ForumEvent::PostCreated,
                post_webhook(11, &format!("<p>gallery</p><p>{images}</p>")),
            )
            .await
            .expect("create");

        let calls = harness.post_bot.calls();
        assert!(matches!(calls[0], TelegramCall::SendText { .. }));
        let sizes: Vec<usize> = calls[1..]
            .iter()
            .map(|call| match call {
                TelegramCall::SendMediaGroup { photos, .. } => photos.len(),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 3]);

        // Replying to any album photo lands on the post.
        assert_eq!(
            harness.store.post_link(1001),
            Some(MessageLink { topic_id: 7, post_number: Some(3) })
        );
    }

    #[tokio::test]
    async fn failed_album_keeps_the_post_mirrored() {
        let harness = Harness::new();
        harness.post_bot.fail_next("send_media_group");
        let images: String = (0..23)
            .map(|i| format!("<img src=\"/uploads/default/{i}.png\">"))
            .collect();
        harness
            .bridge
            .handle_post_event(
                ForumEvent::PostCreated,
                post_webhook(13, &format!("<p>gallery</p><p>{images}</p>")),
            )
            .await
            .expect("album failure is not fatal");

        let sizes: Vec<usize> = harness
            .post_bot
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TelegramCall::SendMediaGroup { photos, .. } => Some(photos.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![10, 3]);
        assert_eq!(
            harness.store.post_mirror(13),
            MirrorState::Mirrored(MirroredMessage {
                message_id: 1000,
                kind: MessageKind::Text,
            })
        );
        assert!(harness.store.post_link(1000).is_some());
        assert!(harness.store.post_link(1001).is_some());
    }

    #[tokio::test]
    async fn single_image_is_sent_as_captioned_photo() {
        let harness = Harness::new();
        harness
            .bridge
            .handle_post_event(
                ForumEvent::PostCreated,
                post_webhook(12, "<p>look <img src=\"https://cdn.example.org/a.jpg\"></p>"),
            )
            .await
            .expect("create");

        let calls = harness.post_bot.calls();
        assert_eq!(calls.len(), 1);
        let TelegramCall::SendPhoto { photo, caption, .. } = &calls[0] else {
            panic!("expected a photo, got {calls:?}");
        };
        assert_eq!(photo, "https://cdn.example.org/a.jpg");
        assert!(caption.as_deref().is_some_and(|c| c.ends_with("look")));

        harness
            .bridge
            .handle_post_event(ForumEvent::PostEdited, post_webhook(12, "<p>changed</p>"))
            .await
            .expect("edit");
        assert!(matches!(
            harness.post_bot.calls().last(),
            Some(TelegramCall::EditCaption { caption, .. }) if caption.ends_with("changed")
        ));
    }

    #[tokio::test]
    async fn destroyed_post_deletes_its_mirror_once() {
        let harness = Harness::new();
        let bridge = &harness.bridge;
        bridge
            .handle_post_event(ForumEvent::PostCreated, post_webhook(13, "<p>bye</p>"))
            .await
            .expect("create");
        bridge
            .handle_post_event(ForumEvent::PostDestroyed, post_webhook(13, ""))
            .await
            .expect("destroy");
        bridge
            .handle_post_event(ForumEvent::PostDestroyed, post_webhook(13, ""))
            .await
            .expect("repeated destroy");

        let deletes = harness
            .post_bot
            .calls()
            .into_iter()
            .filter(|call| matches!(call, TelegramCall::Delete { .. }))
            .count();
        assert_eq!(deletes, 1);
        assert_eq!(harness.store.post_mirror(13), MirrorState::Unmirrored);
    }

    #[tokio::test]
    async fn empty_or_muted_posts_produce_nothing() {
        let harness = Harness::new();
        harness
            .bridge
            .handle_post_event(ForumEvent::PostCreated, post_webhook(14, "<p> </p>"))
            .await
            .expect("empty");

        harness.bridge.settings().toggle_push_posts();
        harness
            .bridge
            .handle_post_event(ForumEvent::PostCreated, post_webhook(15, "<p>text</p>"))
            .await
            .expect("push off");

        assert!(harness.post_bot.calls().is_empty());
    }

    #[tokio::test]
    async fn consecutive_chat_messages_share_one_header() {
        let harness = Harness::new();
        let bridge = &harness.bridge;
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(1, "ann", "<p>one</p>", None))
            .await
            .expect("first");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(2, "ann", "<p>two</p>", None))
            .await
            .expect("second");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(3, "ann", "<p>three</p>", Some(1)))
            .await
            .expect("reply");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageEdited, chat_webhook(1, "ann", "<p>one!</p>", None))
            .await
            .expect("edit");

        let calls = harness.sync_bot.calls();
        assert_eq!(
            calls[0],
            TelegramCall::SendText { chat_id: -100, text: "<b>ann</b>:\none".to_string(), reply_to: None }
        );
        assert_eq!(
            calls[1],
            TelegramCall::SendText { chat_id: -100, text: "two".to_string(), reply_to: None }
        );
        assert_eq!(
            calls[2],
            TelegramCall::SendText { chat_id: -100, text: "<b>ann</b>:\nthree".to_string(), reply_to: Some(1000) }
        );
        assert_eq!(
            calls[3],
            TelegramCall::EditText { message_id: 1000, text: "<b>ann</b>:\none!".to_string() }
        );
    }

    #[tokio::test]
    async fn chat_mirror_respects_filters() {
        let harness = Harness::new();
        let bridge = &harness.bridge;

        let mut other_channel = chat_webhook(4, "ann", "<p>x</p>", None);
        other_channel.channel.slug = "general".to_string();
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, other_channel)
            .await
            .expect("other channel");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(5, "system", "<p>x</p>", None))
            .await
            .expect("own account");
        bridge.settings().set_sync_chat(false);
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(6, "ann", "<p>x</p>", None))
            .await
            .expect("sync off");

        assert!(harness.sync_bot.calls().is_empty());
    }

    #[tokio::test]
    async fn trashed_chat_message_deletes_mirror() {
        let harness = Harness::new();
        let bridge = &harness.bridge;
        bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, chat_webhook(7, "ann", "<p>oops</p>", None))
            .await
            .expect("create");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageTrashed, chat_webhook(7, "ann", "", None))
            .await
            .expect("trash");
        bridge
            .handle_chat_event(ForumEvent::ChatMessageTrashed, chat_webhook(8, "ann", "", None))
            .await
            .expect("trash unknown");

        let calls = harness.sync_bot.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], TelegramCall::Delete { message_id: 1000 });
    }

    #[tokio::test]
    async fn chat_uploads_become_photos() {
        let harness = Harness::new();
        let mut webhook = chat_webhook(9, "ann", "<p>pic</p>", None);
        webhook.message.uploads = vec![crate::discourse::types::ChatUpload {
            url: "/uploads/default/x.png".to_string(),
        }];
        harness
            .bridge
            .handle_chat_event(ForumEvent::ChatMessageCreated, webhook)
            .await
            .expect("create");

        assert_eq!(
            harness.sync_bot.calls(),
            vec![TelegramCall::SendPhoto {
                chat_id: -100,
                photo: "https://forum.example.org/uploads/default/x.png".to_string(),
                caption: Some("<b>ann</b>:\npic".to_string()),
            }]
        );
        assert!(harness.store.chat_by_telegram(1000).is_some());
    }
}
