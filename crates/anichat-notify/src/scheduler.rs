//! Periodic cache refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Whether the host surface is currently shown to the user.
///
/// Background hosts skip periodic and broadcast-triggered refreshes.
#[derive(Debug, Clone)]
pub struct Visibility {
    tx: watch::Sender<bool>,
}

impl Visibility {
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(visible);
        Self { tx }
    }

    pub fn set(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                return false;
            }
            *current = visible;
            true
        });
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Something the scheduler can refresh.
#[async_trait]
pub(crate) trait RefreshTarget: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn refresh(&self);
}

pub(crate) struct RefreshScheduler<T: ?Sized> {
    target: Arc<T>,
    period: Duration,
    visibility: Visibility,
}

impl<T: RefreshTarget + ?Sized> RefreshScheduler<T> {
    pub(crate) fn new(target: Arc<T>, period: Duration, visibility: Visibility) -> Self {
        Self {
            target,
            period,
            visibility,
        }
    }

    /// Tick every `period` until `cancel` fires.
    ///
    /// A skipped tick never stops the timer. Becoming visible while connected
    /// refreshes immediately without shifting the timer's phase.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut visible_rx = self.visibility.subscribe();
        let mut was_visible = *visible_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if self.target.is_connected() && self.visibility.is_visible() {
                        trace!("Periodic refresh");
                        self.target.refresh().await;
                    } else {
                        trace!("Skipping periodic refresh");
                    }
                }

                changed = visible_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let visible = *visible_rx.borrow_and_update();
                    if visible && !was_visible && self.target.is_connected() {
                        debug!("Became visible, refreshing");
                        self.target.refresh().await;
                    }
                    was_visible = visible;
                }
            }
        }

        debug!("Refresh scheduler stopped");
    }
}
