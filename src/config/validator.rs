use thiserror::Error;
use url::Url;

use super::Config;

/// Room for the truncation notice.
const MIN_MESSAGE_LENGTH: usize = 20;
const MAX_CAPTION_LENGTH: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.group_id == 0 {
            return Err(ConfigError::InvalidConfig(
                "telegram.group_id cannot be zero".to_string(),
            ));
        }

        if self.telegram.post_bot_token.is_empty() || self.telegram.sync_bot_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "telegram bot tokens cannot be empty".to_string(),
            ));
        }

        if self.discourse.url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "discourse.url cannot be empty".to_string(),
            ));
        }

        if let Err(err) = Url::parse(&self.discourse.url) {
            return Err(ConfigError::InvalidConfig(format!(
                "discourse.url is not a valid url: {err}"
            )));
        }

        if self.discourse.api_key.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "discourse.api_key cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.bridge.max_post_length < MIN_MESSAGE_LENGTH
            || self.bridge.max_caption_length < MIN_MESSAGE_LENGTH
        {
            return Err(ConfigError::InvalidConfig(format!(
                "bridge.max_post_length and bridge.max_caption_length must be at least {MIN_MESSAGE_LENGTH}"
            )));
        }

        if self.bridge.max_caption_length > MAX_CAPTION_LENGTH {
            return Err(ConfigError::InvalidConfig(format!(
                "bridge.max_caption_length cannot exceed Telegram's {MAX_CAPTION_LENGTH}"
            )));
        }

        if self.web.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "web.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }
}
