use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::BridgeConfig;

const FIRST_TOPIC_PAGE: &str = "/latest";

/// Sender of the most recent mirrored message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    Forum(String),
    Telegram(i64),
}

/// Process-wide toggles flipped by chat commands. Not persisted.
pub struct BotSettings {
    push_posts: AtomicBool,
    sync_chat: AtomicBool,
    muted: AtomicBool,
    topic_cursor: Mutex<String>,
    last_authors: Mutex<HashMap<i64, Author>>,
}

impl BotSettings {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            push_posts: AtomicBool::new(config.push_posts),
            sync_chat: AtomicBool::new(config.sync_chat),
            muted: AtomicBool::new(false),
            topic_cursor: Mutex::new(FIRST_TOPIC_PAGE.to_string()),
            last_authors: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_posts(&self) -> bool {
        self.push_posts.load(Ordering::Relaxed)
    }

    /// Flips post pushing and returns the new value.
    pub fn toggle_push_posts(&self) -> bool {
        !self.push_posts.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn sync_chat(&self) -> bool {
        self.sync_chat.load(Ordering::Relaxed)
    }

    pub fn set_sync_chat(&self, enabled: bool) {
        self.sync_chat.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle_sync_chat(&self) -> bool {
        !self.sync_chat.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Cursor of the next `/next` page; `/latest` rewinds it.
    pub fn topic_cursor(&self) -> String {
        self.topic_cursor.lock().clone()
    }

    pub fn set_topic_cursor(&self, cursor: Option<String>) {
        *self.topic_cursor.lock() = cursor.unwrap_or_else(|| FIRST_TOPIC_PAGE.to_string());
    }

    pub fn rewind_topic_cursor(&self) {
        self.set_topic_cursor(None);
    }

    pub fn last_author(&self, conversation: i64) -> Option<Author> {
        self.last_authors.lock().get(&conversation).cloned()
    }

    pub fn set_last_author(&self, conversation: i64, author: Author) {
        self.last_authors.lock().insert(conversation, author);
    }

    pub fn reset_last_author(&self, conversation: i64) {
        self.last_authors.lock().remove(&conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::{Author, BotSettings};
    use crate::config::BridgeConfig;

    #[test]
    fn toggles_report_new_value() {
        let settings = BotSettings::new(&BridgeConfig::default());
        assert!(settings.push_posts());
        assert!(!settings.toggle_push_posts());
        assert!(settings.toggle_push_posts());

        assert!(!settings.sync_chat());
        assert!(settings.toggle_sync_chat());
        settings.set_sync_chat(false);
        assert!(!settings.sync_chat());
    }

    #[test]
    fn authors_are_tracked_per_conversation() {
        let settings = BotSettings::new(&BridgeConfig::default());
        settings.set_last_author(1, Author::Forum("ann".to_string()));
        settings.set_last_author(2, Author::Telegram(5));

        assert_eq!(settings.last_author(1), Some(Author::Forum("ann".to_string())));
        settings.reset_last_author(1);
        assert_eq!(settings.last_author(1), None);
        assert_eq!(settings.last_author(2), Some(Author::Telegram(5)));
    }

    #[test]
    fn cursor_falls_back_to_first_page() {
        let settings = BotSettings::new(&BridgeConfig::default());
        settings.set_topic_cursor(Some("/latest?page=1".to_string()));
        assert_eq!(settings.topic_cursor(), "/latest?page=1");
        settings.set_topic_cursor(None);
        assert_eq!(settings.topic_cursor(), "/latest");
    }
}
