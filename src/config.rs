pub use self::parser::{
    AuthConfig, BridgeConfig, Config, DatabaseConfig, DbType, DiscourseConfig, LoggingConfig,
    StoreConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
