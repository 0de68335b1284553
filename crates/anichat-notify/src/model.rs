//! Notification records shared with the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned notification identifier.
pub type NotificationId = i64;

/// A single notification as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    /// Category tag, only used to group toasts
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        !self.read
    }
}

/// Payload of `broadcast_notification`: a notification without its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastNotification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload of `notification_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub notifications: Vec<Notification>,
    /// Count declared by the server; informational only.
    pub count: usize,
}

/// Items that carry a stable identity for deduplication.
pub trait Keyed {
    fn key(&self) -> NotificationId;
}

impl Keyed for Notification {
    fn key(&self) -> NotificationId {
        self.id
    }
}
