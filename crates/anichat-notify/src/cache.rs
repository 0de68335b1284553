//! Bounded, deduplicated client-side view of the user's recent notifications.
//!
//! The cache is newest-first: merged items are pushed to the front and capacity
//! pressure evicts from the back. An id index backs every insertion so the
//! cache never holds two entries with the same id.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::model::{Notification, NotificationId};

#[derive(Debug, Clone)]
pub struct NotificationCache {
    items: VecDeque<Notification>,
    ids: FxHashSet<NotificationId>,
    capacity: usize,
    stale: bool,
}

impl NotificationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            ids: FxHashSet::default(),
            capacity,
            stale: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an item with this id is cached.
    pub fn has(&self, id: NotificationId) -> bool {
        self.ids.contains(&id)
    }

    /// Insert at the front if the id is new. Returns `false` for duplicates.
    ///
    /// Does not enforce capacity; callers follow up with [`evict_overflow`](Self::evict_overflow).
    pub fn add(&mut self, notification: Notification) -> bool {
        if !self.ids.insert(notification.id) {
            return false;
        }
        self.items.push_front(notification);
        true
    }

    /// Drop the oldest entry.
    pub fn evict_oldest(&mut self) -> Option<Notification> {
        let evicted = self.items.pop_back()?;
        self.ids.remove(&evicted.id);
        Some(evicted)
    }

    /// Evict from the back until the cache fits its capacity.
    pub fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            if self.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// Merge pushed items in arrival order and return the ones that were new.
    ///
    /// Each accepted item is prepended, so the last one to arrive ends up first.
    pub fn merge_new(
        &mut self,
        incoming: impl IntoIterator<Item = Notification>,
    ) -> Vec<Notification> {
        let mut accepted = Vec::new();
        for notification in incoming {
            if self.has(notification.id) {
                continue;
            }
            accepted.push(notification.clone());
            self.add(notification);
        }
        self.evict_overflow();
        accepted
    }

    /// Overwrite the cache with a fresh store listing (already newest-first).
    ///
    /// Ids already read locally stay read even if the listing lags behind.
    pub fn replace_all(&mut self, listing: impl IntoIterator<Item = Notification>) {
        let locally_read: FxHashSet<NotificationId> = self
            .items
            .iter()
            .filter(|n| n.read)
            .map(|n| n.id)
            .collect();

        self.items.clear();
        self.ids.clear();
        for mut notification in listing {
            if self.items.len() >= self.capacity {
                break;
            }
            if !self.ids.insert(notification.id) {
                continue;
            }
            if locally_read.contains(&notification.id) {
                notification.read = true;
            }
            self.items.push_back(notification);
        }
        self.stale = false;
    }

    /// Flip `read` to true for the given ids. Returns how many changed.
    pub fn mark_read(&mut self, ids: &[NotificationId]) -> usize {
        let targets: FxHashSet<NotificationId> = ids.iter().copied().collect();
        let mut changed = 0;
        for notification in self.items.iter_mut() {
            if !notification.read && targets.contains(&notification.id) {
                notification.read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Ids of unread entries, newest first.
    pub fn unread_ids(&self) -> Vec<NotificationId> {
        self.items
            .iter()
            .filter(|n| n.is_unread())
            .map(|n| n.id)
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| n.is_unread()).count()
    }

    /// Copy of the current contents, newest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        if !self.has(id) {
            return None;
        }
        self.items.iter().find(|n| n.id == id)
    }

    /// Mark the contents as possibly out of date without dropping them.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}
