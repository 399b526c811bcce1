pub use self::handshake::{AuthHandshake, LogoutOutcome};
pub use self::keys::KeyPair;

mod handshake;
mod keys;
