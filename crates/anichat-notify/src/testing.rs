//! Scripted push transport and in-memory store for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::{NotifyError, Result};
use crate::event::PushEvent;
use crate::model::{Notification, NotificationId};
use crate::store::NotificationStore;
use crate::transport::{PushStream, PushTransport};

enum Outcome {
    Fail,
    Hang,
    Open,
}

/// One scripted `connect` call.
pub(crate) struct ScriptedSession {
    outcome: Outcome,
    items: VecDeque<Result<PushEvent>>,
    ends: bool,
}

impl ScriptedSession {
    /// Connects and stays open after its items are delivered.
    pub(crate) fn open() -> Self {
        Self {
            outcome: Outcome::Open,
            items: VecDeque::new(),
            ends: false,
        }
    }

    pub(crate) fn fail() -> Self {
        Self {
            outcome: Outcome::Fail,
            ..Self::open()
        }
    }

    /// `connect` never resolves.
    pub(crate) fn hang() -> Self {
        Self {
            outcome: Outcome::Hang,
            ..Self::open()
        }
    }

    /// The stream ends once its items are delivered.
    pub(crate) fn ends(mut self) -> Self {
        self.ends = true;
        self
    }

    pub(crate) fn with_event(mut self, event: PushEvent) -> Self {
        self.items.push_back(Ok(event));
        self
    }

    pub(crate) fn with_error(mut self, error: NotifyError) -> Self {
        self.items.push_back(Err(error));
        self
    }
}

pub(crate) struct ScriptedTransport {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    connect_calls: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            connect_calls: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(&self, _token: &str) -> Result<Box<dyn PushStream>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().pop_front();
        let Some(session) = session else {
            return Err(NotifyError::connection("no scripted session left"));
        };

        match session.outcome {
            Outcome::Fail => Err(NotifyError::connection("scripted failure")),
            Outcome::Hang => std::future::pending().await,
            Outcome::Open => Ok(Box::new(ScriptedStream {
                items: session.items,
                ends: session.ends,
                closed: self.closed.clone(),
            })),
        }
    }
}

struct ScriptedStream {
    items: VecDeque<Result<PushEvent>>,
    ends: bool,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl PushStream for ScriptedStream {
    async fn next_event(&mut self) -> Option<Result<PushEvent>> {
        if let Some(item) = self.items.pop_front() {
            return Some(item);
        }
        if self.ends {
            return None;
        }
        std::future::pending().await
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory [`NotificationStore`] that records every call.
#[derive(Default)]
pub(crate) struct MemoryStore {
    listing: Mutex<Vec<Notification>>,
    offline: AtomicBool,
    rejected: Mutex<FxHashSet<NotificationId>>,
    fetch_calls: AtomicUsize,
    marked: Mutex<Vec<NotificationId>>,
}

impl MemoryStore {
    pub(crate) fn new(listing: Vec<Notification>) -> Self {
        Self {
            listing: Mutex::new(listing),
            ..Default::default()
        }
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// `mark_read` fails for these ids.
    pub(crate) fn reject(&self, ids: impl IntoIterator<Item = NotificationId>) {
        self.rejected.lock().extend(ids);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn marked(&self) -> Vec<NotificationId> {
        self.marked.lock().clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn fetch_recent(&self, limit: usize, _fresh: bool) -> Result<Vec<Notification>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotifyError::connection("store offline"));
        }
        Ok(self.listing.lock().iter().take(limit).cloned().collect())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        tokio::task::yield_now().await;
        if self.rejected.lock().contains(&id) {
            return Err(NotifyError::Status {
                status: 500,
                url: format!("memory://notifications/{id}/read"),
            });
        }
        self.marked.lock().push(id);
        for notification in self.listing.lock().iter_mut() {
            if notification.id == id {
                notification.read = true;
            }
        }
        Ok(())
    }
}
