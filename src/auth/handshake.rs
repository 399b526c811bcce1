use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::keys::KeyPair;
use crate::config::AuthConfig;
use crate::db::{CorrelationStore, PendingLogin};
use crate::discourse::{Credential, ForumApi};
use crate::error::{HandshakeError, PlatformError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub url: String,
    pub nonce: String,
}

#[derive(Debug)]
pub enum LogoutOutcome {
    NotLoggedIn,
    Revoked,
    /// The binding was dropped locally but the forum refused the revocation.
    RevokeFailed(PlatformError),
}

#[derive(Debug, Deserialize)]
struct DecryptedPayload {
    key: String,
    nonce: String,
}

pub struct AuthHandshake {
    keys: KeyPair,
    store: CorrelationStore,
    forum_url: String,
    config: AuthConfig,
}

impl AuthHandshake {
    pub fn new(keys: KeyPair, store: CorrelationStore, forum_url: &str, config: AuthConfig) -> Self {
        Self {
            keys,
            store,
            forum_url: forum_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    /// Starts a login for `uid` and returns the URL the user has to open.
    /// The nonce stays pending until a matching payload arrives or it expires.
    pub fn begin(&self, uid: i64, chat_id: i64) -> Result<LoginRequest, HandshakeError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let client_id = format!("telegram_bridge_{}", &Uuid::new_v4().simple().to_string()[..16]);

        let mut url = Url::parse(&format!("{}/user-api-key/new", self.forum_url))?;
        url.query_pairs_mut()
            .append_pair("application_name", &self.config.application_name)
            .append_pair("client_id", &client_id)
            .append_pair("scopes", &self.config.scopes)
            .append_pair("public_key", self.keys.public_key_pem())
            .append_pair("nonce", &nonce);
        if !self.config.redirect_url.is_empty() {
            url.query_pairs_mut()
                .append_pair("auth_redirect", &self.config.redirect_url);
        }

        self.store
            .record_pending_login(&nonce, PendingLogin { uid, chat_id });
        Ok(LoginRequest {
            url: url.into(),
            nonce,
        })
    }

    /// Decrypts the redirect payload and binds the user API key it carries.
    /// The nonce is consumed only once decryption succeeded.
    pub fn complete(&self, payload: &str) -> Result<PendingLogin, HandshakeError> {
        let normalized: String = payload
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();
        let ciphertext = STANDARD
            .decode(normalized.as_bytes())
            .map_err(|e| HandshakeError::MalformedPayload(e.to_string()))?;
        let plaintext = self.keys.decrypt(&ciphertext)?;
        let decrypted: DecryptedPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| HandshakeError::MalformedPayload(e.to_string()))?;

        let pending = self
            .store
            .take_pending_login(&decrypted.nonce)
            .ok_or(HandshakeError::UnknownNonce)?;
        self.store.bind_credential(pending.uid, &decrypted.key);
        info!(uid = pending.uid, "Bound forum user API key");
        Ok(pending)
    }

    pub fn is_bound(&self, uid: i64) -> bool {
        self.store.credential(uid).is_some()
    }

    pub fn credential_for(&self, uid: i64) -> Credential {
        match self.store.credential(uid) {
            Some(key) => Credential::User(key),
            None => Credential::Bridge,
        }
    }

    /// Drops the binding and revokes the key with the forum. The binding is
    /// removed even when revocation fails.
    pub async fn logout(&self, uid: i64, forum: &dyn ForumApi) -> LogoutOutcome {
        let Some(key) = self.store.unbind_credential(uid) else {
            return LogoutOutcome::NotLoggedIn;
        };
        match forum.revoke_user_api_key(&key).await {
            Ok(()) => LogoutOutcome::Revoked,
            Err(err) => {
                warn!(uid, "Failed to revoke user API key: {err}");
                LogoutOutcome::RevokeFailed(err)
            }
        }
    }
}
