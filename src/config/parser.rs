use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub discourse: DiscourseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub web: WebConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(alias = "GroupId")]
    pub group_id: i64,
    #[serde(alias = "postBotToken")]
    pub post_bot_token: String,
    #[serde(alias = "syncBotToken")]
    pub sync_bot_token: String,
    /// Username of the post bot, used to recognise replies to its own messages.
    #[serde(default)]
    pub post_bot_username: String,
    /// Username of the sync bot; replies to any other bot are not mirrored.
    #[serde(default)]
    pub sync_bot_username: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscourseConfig {
    pub url: String,
    #[serde(alias = "channelId")]
    pub channel_id: i64,
    #[serde(default = "default_sync_channel_slug")]
    pub sync_channel_slug: String,
    #[serde(alias = "Api-Username")]
    pub api_username: String,
    #[serde(alias = "Api-Key")]
    pub api_key: String,
    /// Forum account the bridge posts as; its chat messages are never mirrored back.
    #[serde(default)]
    pub bot_username: String,
    /// Categories listed by `/latest`; empty lists every category.
    #[serde(default)]
    pub topic_categories: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            redirect_url: String::new(),
            scopes: default_scopes(),
            key_bits: default_key_bits(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_true")]
    pub push_posts: bool,
    #[serde(default)]
    pub sync_chat: bool,
    #[serde(default = "default_max_post_length")]
    pub max_post_length: usize,
    #[serde(default = "default_max_caption_length")]
    pub max_caption_length: usize,
    #[serde(default = "default_echo_settle_ms")]
    pub echo_settle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            push_posts: true,
            sync_chat: false,
            max_post_length: default_max_post_length(),
            max_caption_length: default_max_caption_length(),
            echo_settle_ms: default_echo_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("memory://") {
            DbType::Memory
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DbType::Postgres
        } else {
            DbType::Sqlite
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite | DbType::Memory => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite | DbType::Memory => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_flush_tick_ms")]
    pub flush_tick_ms: u64,
    #[serde(default = "default_link_ttl_hours")]
    pub link_ttl_hours: u64,
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_tick_ms: default_flush_tick_ms(),
            link_ttl_hours: default_link_ttl_hours(),
            nonce_ttl_secs: default_nonce_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(ToOwned::to_owned)
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("BRIDGE_TELEGRAM_POST_BOT_TOKEN") {
            self.telegram.post_bot_token = value;
        }
        if let Ok(value) = std::env::var("BRIDGE_TELEGRAM_SYNC_BOT_TOKEN") {
            self.telegram.sync_bot_token = value;
        }
        if let Ok(value) = std::env::var("BRIDGE_DISCOURSE_API_KEY") {
            self.discourse.api_key = value;
        }
    }

    /// Forum base URL without a trailing slash.
    pub fn forum_url(&self) -> &str {
        self.discourse.url.trim_end_matches('/')
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_sync_channel_slug() -> String {
    "authened".to_string()
}

fn default_application_name() -> String {
    "FutaTelegramBot".to_string()
}

fn default_scopes() -> String {
    "read,write".to_string()
}

fn default_key_bits() -> usize {
    2048
}

fn default_max_post_length() -> usize {
    3000
}

fn default_max_caption_length() -> usize {
    1000
}

fn default_echo_settle_ms() -> u64 {
    100
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50055
}

fn default_flush_tick_ms() -> u64 {
    1000
}

fn default_link_ttl_hours() -> u64 {
    24 * 30
}

fn default_nonce_ttl_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
