//! Push channel events and the events the service re-publishes to its consumers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::error::{NotifyError, Result};
use crate::model::{BroadcastNotification, Notification, NotificationBatch};
use crate::toast::Toast;

/// Server → client events on the push channel.
///
/// On the wire each event is a JSON text frame `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Connect,
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    ConnectError {
        message: String,
    },
    NewNotification(Notification),
    BroadcastNotification(BroadcastNotification),
    NotificationBatch(NotificationBatch),
}

impl PushEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| NotifyError::protocol(format!("undecodable push frame: {e}")))
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
            Self::NewNotification(_) => "new_notification",
            Self::BroadcastNotification(_) => "broadcast_notification",
            Self::NotificationBatch(_) => "notification_batch",
        }
    }
}

/// Events published by [`NotificationService`](crate::NotificationService).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The `is_connected` flag flipped
    ConnectionChanged { connected: bool },
    /// Reconnection controller state transition
    StateChanged(ConnectionState),
    /// A reconnect is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// The cache was replaced or merged into
    CacheUpdated { len: usize, unread: usize },
    /// A toast to show
    Toast(Toast),
    /// A refresh failed and the cache was marked stale
    RefreshFailed { error: String },
}
