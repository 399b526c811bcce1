use serde_json::Value;
use thiserror::Error;

/// Failure of an outbound call to either platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{}", render_api_error(*status, status_text, errors))]
    Api {
        status: u16,
        status_text: String,
        errors: Vec<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn api(status: u16, status_text: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Api {
            status,
            status_text: status_text.into(),
            errors,
        }
    }

    /// Builds an API error from a response body, picking up a structured
    /// `errors` field (array or any other JSON value) when the body has one.
    pub fn from_body(status: u16, status_text: impl Into<String>, body: &str) -> Self {
        let errors = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value.get("errors").cloned())
            .map(|errors| match errors {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                Value::String(s) => vec![s],
                other => vec![other.to_string()],
            })
            .unwrap_or_default();
        Self::api(status, status_text, errors)
    }

    /// Human-readable text relayed back to the user whose message failed.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

/// Failure while exchanging a user API key with the forum.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to generate key pair: {0}")]
    KeyGeneration(String),

    #[error("malformed authorization payload: {0}")]
    MalformedPayload(String),

    #[error("failed to decrypt authorization payload: {0}")]
    Decryption(String),

    #[error("unknown or already used nonce")]
    UnknownNonce,

    #[error("invalid authorization url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for PlatformError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

fn render_api_error(status: u16, status_text: &str, errors: &[String]) -> String {
    let mut out = format!("{status} {status_text}");
    if !errors.is_empty() {
        out.push_str(": ");
        out.push_str(&errors.join(";"));
    }
    out
}

/// Summary for any error reaching a handler boundary.
pub fn error_summary(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PlatformError>() {
        Some(platform) => platform.summary(),
        None => err.to_string(),
    }
}
