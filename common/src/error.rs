use thiserror::Error;

use crate::types::Mode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("socket is not connected")]
    NotConnected,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("malformed frame: {0}")]
    Parse(String),
    #[error("server notification: {0}")]
    ServerNotification(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("action change requires manual mode (current mode: {})", .current.as_str())]
    InvalidTransition { current: Mode },
    #[error("http request failed: {0}")]
    Http(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("session closed")]
    Closed,
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
