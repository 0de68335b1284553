//! In-memory store and controllable push transport for service tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anichat_notify::{
    Notification, NotificationId, NotificationStore, NotifyError, PushEvent, PushStream,
    PushTransport, Result,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub fn notification(id: NotificationId, kind: &str) -> Notification {
    Notification {
        id,
        user_id: 1,
        title: format!("title {id}"),
        message: format!("message {id}"),
        kind: kind.to_string(),
        read: false,
        created_at: Utc
            .timestamp_opt(1_700_000_000 + id, 0)
            .single()
            .expect("valid timestamp"),
    }
}

/// Newest-first listing of `ids` in descending order.
pub fn listing(
    ids: impl DoubleEndedIterator<Item = NotificationId>,
    kind: &str,
) -> Vec<Notification> {
    ids.rev().map(|id| notification(id, kind)).collect()
}

/// Store that counts fetches and records how mark-read calls overlap.
#[derive(Default)]
pub struct MemoryStore {
    listing: Mutex<Vec<Notification>>,
    offline: AtomicBool,
    /// `mark_read` does not persist the flag
    forgetful: AtomicBool,
    fetch_calls: AtomicUsize,
    mark_latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    /// Sizes of each group of overlapping mark-read calls
    waves: Mutex<Vec<usize>>,
}

impl MemoryStore {
    pub fn new(listing: Vec<Notification>) -> Arc<Self> {
        Arc::new(Self {
            listing: Mutex::new(listing),
            ..Default::default()
        })
    }

    pub fn set_listing(&self, listing: Vec<Notification>) {
        *self.listing.lock() = listing;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_forgetful(&self, forgetful: bool) {
        self.forgetful.store(forgetful, Ordering::SeqCst);
    }

    pub fn set_mark_latency(&self, latency: Duration) {
        *self.mark_latency.lock() = latency;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn waves(&self) -> Vec<usize> {
        self.waves.lock().clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn fetch_recent(&self, limit: usize, fresh: bool) -> Result<Vec<Notification>> {
        assert!(fresh, "refresh must bypass server caching");
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotifyError::connection("store offline"));
        }
        Ok(self.listing.lock().iter().take(limit).cloned().collect())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        {
            let mut waves = self.waves.lock();
            if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
                waves.push(1);
            } else if let Some(last) = waves.last_mut() {
                *last += 1;
            }
        }

        let latency = *self.mark_latency.lock();
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(NotifyError::connection("store offline"));
        }
        if !self.forgetful.load(Ordering::SeqCst) {
            for notification in self.listing.lock().iter_mut() {
                if notification.id == id {
                    notification.read = true;
                }
            }
        }
        Ok(())
    }
}

/// How one `connect` call behaves.
pub enum Session {
    Fail,
    /// Delivers whatever is sent on the paired sender; dropping the sender
    /// ends the channel.
    Live(mpsc::UnboundedReceiver<PushEvent>),
}

pub fn live() -> (Session, mpsc::UnboundedSender<PushEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Session::Live(rx), tx)
}

#[derive(Default)]
pub struct FakeTransport {
    sessions: Mutex<VecDeque<Session>>,
    connect_calls: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    closed: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new(sessions: Vec<Session>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            ..Default::default()
        })
    }

    pub fn push(&self, session: Session) {
        self.sessions.lock().push_back(session);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn PushStream>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(token.to_string());

        let session = self.sessions.lock().pop_front();
        match session {
            Some(Session::Live(rx)) => Ok(Box::new(FakeStream {
                rx,
                closed: self.closed.clone(),
            })),
            Some(Session::Fail) | None => Err(NotifyError::connection("connection refused")),
        }
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<PushEvent>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl PushStream for FakeStream {
    async fn next_event(&mut self) -> Option<Result<PushEvent>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
