//! Error types for the Herald client.

use herald_api::ErrorCode;
use herald_core::NotificationId;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{code}: {message}")]
    Api { code: ErrorCode, message: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("Notification {id} is not in the local view")]
    NotInView { id: NotificationId },
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl ClientError {
    /// Whether the server rejected the request as not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::Api {
                code: ErrorCode::NotificationNotFound,
                ..
            }
        )
    }
}
