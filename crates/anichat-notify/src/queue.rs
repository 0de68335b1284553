//! Debounced pending queue for push deliveries.
//!
//! Every handler that receives notifications feeds the same [`DebouncedQueue`]:
//! enqueueing re-arms a deadline, and the owner flushes once the deadline
//! passes without further mutations.

use std::collections::VecDeque;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::time::Instant;

use crate::model::{Keyed, NotificationId};

/// Resettable quiet-period deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Start or restart the quiet period.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Arm only if no quiet period is running.
    pub fn arm_if_idle(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.arm();
        true
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// FIFO queue with id-based duplicate suppression, a hard size bound and a
/// debounce deadline.
#[derive(Debug)]
pub struct DebouncedQueue<T> {
    items: VecDeque<T>,
    keys: FxHashSet<NotificationId>,
    capacity: usize,
    debouncer: Debouncer,
    dropped: u64,
}

impl<T: Keyed> DebouncedQueue<T> {
    pub fn new(capacity: usize, delay: Duration) -> Self {
        Self {
            items: VecDeque::new(),
            keys: FxHashSet::default(),
            capacity,
            debouncer: Debouncer::new(delay),
            dropped: 0,
        }
    }

    /// Queue an item. Duplicates and overflow are dropped and return `false`.
    pub fn enqueue(&mut self, item: T) -> bool {
        if self.keys.contains(&item.key()) {
            return false;
        }
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.keys.insert(item.key());
        self.items.push_back(item);
        self.debouncer.arm();
        true
    }

    /// Take at most `limit` items in arrival order.
    ///
    /// Leftovers re-arm the deadline and drain on the next quiet period.
    pub fn flush(&mut self, limit: usize) -> Vec<T> {
        let take = limit.min(self.items.len());
        let batch: Vec<T> = self.items.drain(..take).collect();
        for item in &batch {
            self.keys.remove(&item.key());
        }

        if self.items.is_empty() {
            self.debouncer.disarm();
        } else {
            self.debouncer.arm();
        }
        batch
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Resolves when the quiet period ends; never resolves while empty.
    ///
    /// The future does not borrow the queue, so it can sit in a `select!`
    /// next to branches that enqueue.
    pub fn due(&self) -> impl Future<Output = ()> + use<T> {
        sleep_until_deadline(self.deadline())
    }

    /// Whether the quiet period has elapsed with items waiting.
    pub fn is_due(&self) -> bool {
        self.deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
        self.debouncer.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::notification;

    const DELAY: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_rearms_deadline() {
        let mut queue = DebouncedQueue::new(10, DELAY);
        assert!(queue.deadline().is_none());

        assert!(queue.enqueue(notification(1, "a")));
        let first = queue.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!queue.is_due());
        assert!(queue.enqueue(notification(2, "a")));
        let second = queue.deadline().unwrap();
        assert!(second > first);

        tokio::time::advance(Duration::from_millis(299)).await;
        assert!(!queue.is_due());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(queue.is_due());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_and_overflow_are_dropped() {
        let mut queue = DebouncedQueue::new(2, DELAY);
        assert!(queue.enqueue(notification(1, "a")));
        assert!(!queue.enqueue(notification(1, "a")));
        assert!(queue.enqueue(notification(2, "a")));
        assert!(!queue.enqueue(notification(3, "a")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_is_bounded_and_fifo() {
        let mut queue = DebouncedQueue::new(10, DELAY);
        for id in 1..=5 {
            queue.enqueue(notification(id, "a"));
        }

        let batch = queue.flush(3);
        assert_eq!(batch.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(queue.len(), 2);
        assert!(queue.deadline().is_some());

        // Flushed ids may be queued again.
        assert!(queue.enqueue(notification(1, "a")));

        let rest = queue.flush(10);
        assert_eq!(rest.len(), 3);
        assert!(queue.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_deadline() {
        let mut debouncer = Debouncer::new(DELAY);
        assert!(debouncer.arm_if_idle());
        assert!(!debouncer.arm_if_idle());

        let start = Instant::now();
        sleep_until_deadline(debouncer.deadline()).await;
        assert_eq!(start.elapsed(), DELAY);

        debouncer.disarm();
        let pending = tokio::time::timeout(
            Duration::from_secs(60),
            sleep_until_deadline(debouncer.deadline()),
        )
        .await;
        assert!(pending.is_err());
    }
}
