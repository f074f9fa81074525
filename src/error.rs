use serde_json::Value;
use thiserror::Error;

/// Fallback shown when the server did not send a usable `message`
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again";

/// Errors returned by every client operation
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-2xx status
    #[error("Request failed with status {status}")]
    Request { status: u16, info: Value },

    /// The refresh token is missing or was rejected; the user must log in again
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// The request never produced an HTTP response
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for server rejections, `None` for everything else
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Message suitable for showing to a user.
    ///
    /// Server rejections use the `message` field of the error body when it is a
    /// non-empty string, falling back to a generic text.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Request { info, .. } => info
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(GENERIC_FAILURE_MESSAGE)
                .to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors reading or writing the persisted session
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse session file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize session: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not locate home directory")]
    NoHomeDir,
}
