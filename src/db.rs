pub use self::correlation::CorrelationStore;
pub use self::error::DatabaseError;
pub use self::kv::KvStore;
pub use self::manager::DatabaseManager;
pub use self::models::{
    ChatLink, JoinRequestRecord, MessageKind, MessageLink, MirrorState, MirroredMessage,
    PendingLogin,
};
pub use self::stores::{KvBackend, MemoryKvBackend};

pub mod correlation;
pub mod error;
pub mod kv;
pub mod manager;
pub mod models;
pub mod schema;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;
