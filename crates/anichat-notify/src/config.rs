//! Tunables for the notification client.
//!
//! Every knob of the delivery path lives in [`NotifyConfig`]. The defaults
//! match the values the web client shipped with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

/// Default values.
pub mod defaults {
    /// Quiet period before a burst of push events is flushed.
    pub const DEBOUNCE_DELAY_MS: u64 = 300;
    /// Period of the background refresh timer.
    pub const REFRESH_INTERVAL_MS: u64 = 60_000;
    /// Minimum spacing between two store fetches.
    pub const MINIMUM_REFRESH_INTERVAL_MS: u64 = 5_000;
    /// Base reconnect delay.
    pub const BASE_RECONNECT_DELAY_MS: u64 = 1_000;
    /// Reconnect delay cap.
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;
    /// Push channel handshake timeout.
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
    /// Store request timeout.
    pub const REQUEST_TIMEOUT_MS: u64 = 15_000;
    /// Items processed per debounce flush.
    pub const NOTIFICATION_BATCH_SIZE: usize = 10;
    /// Client cache capacity.
    pub const MAX_CACHE_SIZE: usize = 50;
    /// In-flight mark-as-read requests per batch.
    pub const MARK_READ_CONCURRENCY: usize = 5;
    /// How long a toast stays on screen.
    pub const TOAST_DURATION_MS: u64 = 4_000;
    /// Character budget for toast messages.
    pub const TOAST_MESSAGE_MAX_CHARS: usize = 100;
}

/// Configuration for the notification client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Debounce window for incoming push events, in milliseconds.
    pub debounce_delay_ms: u64,
    /// Background refresh period, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Refresh calls closer together than this are dropped, in milliseconds.
    pub min_refresh_interval_ms: u64,
    /// First reconnect delay, in milliseconds.
    pub base_reconnect_delay_ms: u64,
    /// Upper bound for reconnect delays, in milliseconds.
    pub max_reconnect_delay_ms: u64,
    /// Push channel connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Store HTTP request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum number of queued items handled per flush.
    pub batch_size: usize,
    /// Maximum number of cached notifications.
    pub max_cache_size: usize,
    /// Maximum concurrent mark-as-read requests.
    pub mark_read_concurrency: usize,
    /// Toast display duration, in milliseconds.
    pub toast_duration_ms: u64,
    /// Toast message length budget, in characters.
    pub toast_message_max_chars: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: defaults::DEBOUNCE_DELAY_MS,
            refresh_interval_ms: defaults::REFRESH_INTERVAL_MS,
            min_refresh_interval_ms: defaults::MINIMUM_REFRESH_INTERVAL_MS,
            base_reconnect_delay_ms: defaults::BASE_RECONNECT_DELAY_MS,
            max_reconnect_delay_ms: defaults::MAX_RECONNECT_DELAY_MS,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            batch_size: defaults::NOTIFICATION_BATCH_SIZE,
            max_cache_size: defaults::MAX_CACHE_SIZE,
            mark_read_concurrency: defaults::MARK_READ_CONCURRENCY,
            toast_duration_ms: defaults::TOAST_DURATION_MS,
            toast_message_max_chars: defaults::TOAST_MESSAGE_MAX_CHARS,
        }
    }
}

impl NotifyConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.min_refresh_interval_ms)
    }

    pub fn base_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.base_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    /// Pending queue bound: twice the cache size.
    pub fn pending_capacity(&self) -> usize {
        self.max_cache_size.saturating_mul(2)
    }

    /// Check the configuration for values that would stall or break the client.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("debounce_delay_ms", self.debounce_delay_ms),
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("base_reconnect_delay_ms", self.base_reconnect_delay_ms),
            ("max_reconnect_delay_ms", self.max_reconnect_delay_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("batch_size", self.batch_size as u64),
            ("max_cache_size", self.max_cache_size as u64),
            ("mark_read_concurrency", self.mark_read_concurrency as u64),
            ("toast_message_max_chars", self.toast_message_max_chars as u64),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(NotifyError::config(format!("{name} must be greater than zero")));
        }

        if self.base_reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(NotifyError::config(format!(
                "base_reconnect_delay_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.base_reconnect_delay_ms, self.max_reconnect_delay_ms
            )));
        }

        Ok(())
    }
}
