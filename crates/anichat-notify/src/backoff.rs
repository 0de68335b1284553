//! Exponential reconnect backoff.

use std::time::Duration;

/// Reconnect delay tracker.
///
/// The delay for the next attempt is `min(base * 2^attempts, max)`. `attempts`
/// grows by one on every disconnect or failed connect and drops to zero on
/// every successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: 0,
        }
    }

    /// Delay for a given attempt count.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        // 2^attempts saturates instead of overflowing for large counts.
        let multiplier = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Delay before the next reconnect attempt.
    pub fn next_delay(&self) -> Duration {
        self.delay_for(self.attempts)
    }

    /// Record a disconnect or failed attempt.
    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Record a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
