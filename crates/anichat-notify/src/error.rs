//! Notification client error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur while talking to the notification backend.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// HTTP transport errors from the store client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the store
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// WebSocket errors on the push channel
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Payload (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or unknown push frames
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection-related errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect attempt exceeded the configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The owning service was stopped
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl NotifyError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
