//! Notification service.
//!
//! The NotificationService owns the client cache and wires the pieces together:
//! - the connection controller keeps one push channel open per start
//! - a dispatcher feeds push deliveries through the debounced queue into the cache
//! - the refresh scheduler resynchronizes the cache with the store
//!
//! Every task shares one [`CancellationToken`]; `stop()` cancels it and waits
//! for the tasks, so nothing touches the cache after teardown.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::AuthHandle;
use crate::cache::NotificationCache;
use crate::config::NotifyConfig;
use crate::connection::{ChannelSignal, ConnectionController, ConnectionState, ConnectionStatus};
use crate::error::{NotifyError, Result};
use crate::event::{ClientEvent, PushEvent};
use crate::model::{Notification, NotificationId};
use crate::queue::{DebouncedQueue, Debouncer, sleep_until_deadline};
use crate::scheduler::{RefreshScheduler, RefreshTarget, Visibility};
use crate::store::NotificationStore;
use crate::toast;
use crate::transport::PushTransport;

const EVENT_CAPACITY: usize = 256;
const SIGNAL_CAPACITY: usize = 256;

/// Result of [`NotificationService::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache was replaced with this many items.
    Refreshed(usize),
    /// Called again within the minimum refresh interval; nothing was fetched.
    Throttled,
    /// The fetch failed; the cache was kept and marked stale.
    Failed,
    /// The service was stopped.
    Cancelled,
}

/// Result of [`NotificationService::mark_all_as_read`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkReadSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
}

struct ServiceInner {
    config: NotifyConfig,
    store: Arc<dyn NotificationStore>,
    cache: RwLock<NotificationCache>,
    status: Arc<ConnectionStatus>,
    visibility: Visibility,
    last_refresh: Mutex<Option<Instant>>,
    liveness: Mutex<CancellationToken>,
}

impl ServiceInner {
    fn liveness(&self) -> CancellationToken {
        self.liveness.lock().clone()
    }

    fn publish_cache(&self) {
        let (len, unread) = {
            let cache = self.cache.read();
            (cache.len(), cache.unread_count())
        };
        self.status.emit(ClientEvent::CacheUpdated { len, unread });
    }

    async fn refresh_cache(&self, throttle: bool) -> RefreshOutcome {
        let cancel = self.liveness();
        if cancel.is_cancelled() {
            return RefreshOutcome::Cancelled;
        }

        {
            let mut last = self.last_refresh.lock();
            let now = Instant::now();
            let min_interval = self.config.min_refresh_interval();
            if throttle && last.is_some_and(|prev| now.duration_since(prev) < min_interval) {
                trace!("Refresh throttled");
                return RefreshOutcome::Throttled;
            }
            *last = Some(now);
        }

        let fetch = self.store.fetch_recent(self.config.max_cache_size, true);
        let result = tokio::select! {
            _ = cancel.cancelled() => return RefreshOutcome::Cancelled,
            result = fetch => result,
        };

        match result {
            Ok(listing) => {
                let len = {
                    let mut cache = self.cache.write();
                    cache.replace_all(listing);
                    cache.len()
                };
                debug!(count = len, "Notification cache refreshed");
                self.publish_cache();
                RefreshOutcome::Refreshed(len)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh notifications, keeping cached copy");
                self.cache.write().invalidate();
                self.status.emit(ClientEvent::RefreshFailed {
                    error: e.to_string(),
                });
                RefreshOutcome::Failed
            }
        }
    }

    async fn mark_all_as_read(&self) -> MarkReadSummary {
        let cancel = self.liveness();
        let ids = {
            let mut cache = self.cache.write();
            let ids = cache.unread_ids();
            cache.mark_read(&ids);
            ids
        };

        let mut summary = MarkReadSummary {
            requested: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return summary;
        }
        self.publish_cache();

        let mut whole_batch_failed = false;
        for chunk in ids.chunks(self.config.mark_read_concurrency) {
            if cancel.is_cancelled() {
                debug!("Service stopped, abandoning remaining mark-read batches");
                break;
            }
            summary.batches += 1;

            let results = join_all(chunk.iter().map(|&id| self.store.mark_read(id))).await;
            let mut failed_in_chunk = 0;
            for (id, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => {
                        warn!(notification_id = id, error = %e, "Failed to mark notification read");
                        failed_in_chunk += 1;
                    }
                }
            }
            summary.failed += failed_in_chunk;
            if failed_in_chunk == chunk.len() {
                whole_batch_failed = true;
            }
        }

        info!(
            requested = summary.requested,
            succeeded = summary.succeeded,
            failed = summary.failed,
            batches = summary.batches,
            "Marked notifications read"
        );

        if whole_batch_failed {
            // Local state stays read; resync with what the store actually has.
            self.refresh_cache(false).await;
        }
        summary
    }

    async fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        if self.liveness().is_cancelled() {
            return Err(NotifyError::Cancelled);
        }
        let changed = self.cache.write().mark_read(&[id]);
        if changed > 0 {
            self.publish_cache();
        }
        if let Err(e) = self.store.mark_read(id).await {
            warn!(notification_id = id, error = %e, "Failed to mark notification read");
            return Err(e);
        }
        Ok(())
    }

    /// Move at most one batch from the queue into the cache.
    fn flush(&self, queue: &mut DebouncedQueue<Notification>) {
        let batch = queue.flush(self.config.batch_size);
        if batch.is_empty() {
            return;
        }

        let accepted = self.cache.write().merge_new(batch);
        trace!(accepted = accepted.len(), pending = queue.len(), "Flushed pending notifications");
        if accepted.is_empty() {
            return;
        }

        self.publish_cache();
        for toast in toast::summarize(&accepted, &self.config) {
            self.status.emit(ClientEvent::Toast(toast));
        }
    }
}

#[async_trait]
impl RefreshTarget for ServiceInner {
    fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    async fn refresh(&self) {
        self.refresh_cache(true).await;
    }
}

/// Routes channel signals into the cache until cancelled.
struct Dispatcher {
    inner: Arc<ServiceInner>,
    signals: mpsc::Receiver<ChannelSignal>,
    queue: DebouncedQueue<Notification>,
    broadcast: Debouncer,
    refreshes: JoinSet<()>,
}

impl Dispatcher {
    fn new(inner: Arc<ServiceInner>, signals: mpsc::Receiver<ChannelSignal>) -> Self {
        let delay = inner.config.debounce_delay();
        Self {
            queue: DebouncedQueue::new(inner.config.pending_capacity(), delay),
            broadcast: Debouncer::new(delay),
            refreshes: JoinSet::new(),
            inner,
            signals,
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                signal = self.signals.recv() => match signal {
                    Some(signal) => self.handle(signal),
                    None => break,
                },

                _ = self.queue.due() => {
                    self.inner.flush(&mut self.queue);
                }

                _ = sleep_until_deadline(self.broadcast.deadline()) => {
                    self.broadcast.disarm();
                    if self.inner.visibility.is_visible() {
                        self.spawn_refresh();
                    } else {
                        debug!("Hidden, ignoring broadcast refresh");
                    }
                }

                Some(_) = self.refreshes.join_next(), if !self.refreshes.is_empty() => {}
            }
        }

        if self.queue.dropped() > 0 {
            debug!(dropped = self.queue.dropped(), "Pending queue overflowed during session");
        }
        // Dropping the JoinSet aborts refreshes still in flight.
        debug!("Notification dispatcher stopped");
    }

    fn handle(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected => self.spawn_refresh(),
            ChannelSignal::Event(PushEvent::NewNotification(notification)) => {
                self.enqueue(notification);
            }
            ChannelSignal::Event(PushEvent::NotificationBatch(batch)) => {
                if batch.count != batch.notifications.len() {
                    debug!(
                        declared = batch.count,
                        actual = batch.notifications.len(),
                        "Batch count mismatch"
                    );
                }
                for notification in batch.notifications {
                    self.enqueue(notification);
                }
            }
            ChannelSignal::Event(PushEvent::BroadcastNotification(broadcast)) => {
                if self.broadcast.arm_if_idle() {
                    debug!(title = %broadcast.title, "Broadcast received, refresh scheduled");
                }
            }
            ChannelSignal::Event(other) => {
                trace!(event = other.name(), "Ignoring lifecycle event");
            }
        }
    }

    fn enqueue(&mut self, notification: Notification) {
        let id = notification.id;
        if !self.queue.enqueue(notification) {
            trace!(notification_id = id, "Dropped duplicate or overflowing notification");
        }
    }

    fn spawn_refresh(&mut self) {
        let inner = self.inner.clone();
        self.refreshes.spawn(async move {
            inner.refresh_cache(true).await;
        });
    }
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Real-time notification client.
///
/// Construct once, call [`start`](Self::start) to connect, and read the cache
/// through the accessors or follow it with [`subscribe`](Self::subscribe).
pub struct NotificationService {
    inner: Arc<ServiceInner>,
    transport: Arc<dyn PushTransport>,
    auth: AuthHandle,
    running: Mutex<Option<Running>>,
}

impl NotificationService {
    pub fn new(
        config: NotifyConfig,
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn PushTransport>,
        auth: AuthHandle,
    ) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = ServiceInner {
            cache: RwLock::new(NotificationCache::new(config.max_cache_size)),
            status: Arc::new(ConnectionStatus::new(events)),
            visibility: Visibility::default(),
            last_refresh: Mutex::new(None),
            liveness: Mutex::new(CancellationToken::new()),
            store,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
            transport,
            auth,
            running: Mutex::new(None),
        })
    }

    /// Start the connection controller, dispatcher and refresh scheduler.
    ///
    /// A running instance is torn down first.
    pub async fn start(&self) {
        self.stop().await;

        let cancel = CancellationToken::new();
        *self.inner.liveness.lock() = cancel.clone();

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let controller = ConnectionController::new(
            &self.inner.config,
            self.transport.clone(),
            self.auth.clone(),
            self.inner.status.clone(),
            signal_tx,
        );
        let dispatcher = Dispatcher::new(self.inner.clone(), signal_rx);
        let scheduler = RefreshScheduler::new(
            self.inner.clone(),
            self.inner.config.refresh_interval(),
            self.inner.visibility.clone(),
        );

        let handles = vec![
            tokio::spawn(controller.run(cancel.clone())),
            tokio::spawn(dispatcher.run(cancel.clone())),
            tokio::spawn(scheduler.run(cancel.clone())),
        ];

        info!("Notification service started");
        *self.running.lock() = Some(Running { cancel, handles });
    }

    /// Tear down: cancel every task, close the channel and wait for them.
    ///
    /// Later refreshes return [`RefreshOutcome::Cancelled`] until the next start.
    pub async fn stop(&self) {
        self.inner.liveness().cancel();

        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        for handle in running.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Notification task ended abnormally");
            }
        }
        self.inner.status.set_connected(false);
        self.inner.status.set_state(ConnectionState::TornDown);
        info!("Notification service stopped");
    }

    /// Replace the cache with a fresh store listing.
    ///
    /// Never fails: errors keep the cached copy and mark it stale.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh_cache(true).await
    }

    /// Optimistically mark every cached unread notification read, then update
    /// the store in bounded-concurrency batches.
    pub async fn mark_all_as_read(&self) -> MarkReadSummary {
        self.inner.mark_all_as_read().await
    }

    /// Optimistically mark one notification read and update the store.
    ///
    /// The local flag stays set even if the store call fails.
    pub async fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        self.inner.mark_as_read(id).await
    }

    /// Cached notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.cache.read().snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.cache.read().unread_count()
    }

    /// Whether the last refresh failed and the cache may be out of date.
    pub fn is_stale(&self) -> bool {
        self.inner.cache.read().is_stale()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.status.subscribe()
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.visibility.set(visible);
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.inner.config
    }

    pub fn auth(&self) -> &AuthHandle {
        &self.auth
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.inner.liveness().cancel();
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}
