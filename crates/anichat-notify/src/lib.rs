//! anichat-notify: real-time notification client for the anichat backend.
//!
//! The client keeps a bounded, deduplicated view of the user's recent
//! notifications up to date from two sources: a push channel and the REST
//! notification store.
//!
//! ## Core Types
//!
//! - [`NotificationService`] - Lifecycle owner; `start()`/`stop()` plus the cache operations
//! - [`Notification`] - A single notification record
//! - [`ClientEvent`] - What the service publishes to the UI layer
//! - [`NotifyConfig`] - Every tunable in one place
//!
//! ## Building Blocks
//!
//! - [`NotificationCache`] - Newest-first cache with an id index
//! - [`DebouncedQueue`] - Pending queue flushed after a quiet period
//! - [`ReconnectBackoff`] - Capped exponential reconnect delay
//! - [`toast::summarize`] - One toast per notification type
//!
//! ## Seams
//!
//! - [`NotificationStore`] / [`HttpNotificationStore`] - Request/response store access
//! - [`PushTransport`] / [`WebSocketTransport`] - Push channel connections

pub mod auth;
pub mod backoff;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod toast;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{AuthHandle, TokenFile};
pub use backoff::ReconnectBackoff;
pub use cache::NotificationCache;
pub use config::NotifyConfig;
pub use connection::ConnectionState;
pub use error::{NotifyError, Result};
pub use event::{ClientEvent, PushEvent};
pub use model::{BroadcastNotification, Notification, NotificationBatch, NotificationId};
pub use queue::{DebouncedQueue, Debouncer};
pub use scheduler::Visibility;
pub use service::{MarkReadSummary, NotificationService, RefreshOutcome};
pub use store::{HttpNotificationStore, NotificationStore, install_rustls_provider};
pub use toast::Toast;
pub use transport::{PushStream, PushTransport, WebSocketTransport};
