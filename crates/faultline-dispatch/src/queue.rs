//! Bounded in-memory queue of events awaiting delivery.
//!
//! The queue is the only shared mutable structure between capture paths
//! and the dispatcher task. Producers never block and never perform I/O:
//! when the queue is full the oldest pending event is evicted to make
//! room, so under sustained pressure the newest events win.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use faultline_core::ErrorEvent;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// An event waiting for delivery, with its attempt count so far.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// The canonical event to deliver.
    pub event: ErrorEvent,
    /// Completed delivery attempts for this event.
    pub attempts: u32,
}

impl PendingEvent {
    /// Wraps a freshly captured event with no attempts recorded.
    pub fn new(event: ErrorEvent) -> Self {
        Self { event, attempts: 0 }
    }
}

/// Bounded FIFO queue with oldest-first eviction.
///
/// `push` is O(1) and lock-scoped; the dispatcher is woken through the
/// embedded [`Notify`] rather than polling an empty queue.
pub struct EventQueue {
    pending: Mutex<VecDeque<PendingEvent>>,
    capacity: usize,
    notify: Notify,
    evicted_total: AtomicU64,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` pending events.
    ///
    /// A capacity of zero is coerced to one so `push` always has room for
    /// the incoming event.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Enqueues a captured event, evicting the oldest entry when full.
    ///
    /// Returns the evicted event, if any. Never blocks and never fails;
    /// capture paths stay O(1) regardless of delivery backlog.
    pub fn push(&self, event: ErrorEvent) -> Option<PendingEvent> {
        let evicted = {
            let mut pending = self.lock_pending();
            let evicted =
                if pending.len() >= self.capacity { pending.pop_front() } else { None };
            pending.push_back(PendingEvent::new(event));
            evicted
        };

        if let Some(dropped) = &evicted {
            self.evicted_total.fetch_add(1, Ordering::Relaxed);
            debug!(
                event_id = %dropped.event.id,
                queue_capacity = self.capacity,
                "pending queue full, evicted oldest event"
            );
        }

        self.notify.notify_one();
        evicted
    }

    /// Returns a retried batch to the front of the queue, oldest first.
    ///
    /// Events that no longer fit are discarded rather than displacing
    /// newer captures that arrived while the batch was in flight.
    pub fn requeue_front(&self, batch: Vec<PendingEvent>) {
        let mut discarded = 0u64;
        {
            let mut pending = self.lock_pending();
            for item in batch.into_iter().rev() {
                if pending.len() >= self.capacity {
                    discarded += 1;
                    continue;
                }
                pending.push_front(item);
            }
        }

        if discarded > 0 {
            self.evicted_total.fetch_add(discarded, Ordering::Relaxed);
            warn!(discarded, "queue filled during delivery, discarded retried events");
        }

        self.notify.notify_one();
    }

    /// Removes and returns up to `max` pending events, oldest first.
    pub fn drain(&self, max: usize) -> Vec<PendingEvent> {
        let mut pending = self.lock_pending();
        let take = max.min(pending.len());
        pending.drain(..take).collect()
    }

    /// Waits until a producer signals new work.
    ///
    /// A permit stored by a push that raced this call resolves the wait
    /// immediately, so no enqueue wakeup is ever lost.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Wakes the dispatcher without enqueuing, used for shutdown nudges.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Number of events currently pending.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    /// Maximum number of events the queue retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events evicted or discarded since creation.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingEvent>> {
        // Mutex poisoning requires a panic mid-push or mid-drain, and both
        // critical sections are panic-free queue operations. Recover the
        // inner state rather than poisoning every later capture.
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("evicted_total", &self.evicted_total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use faultline_core::ServiceContext;

    use super::*;

    fn event(message: &str) -> ErrorEvent {
        ErrorEvent::new(message, ServiceContext::new("queue-test", "1.0.0"))
    }

    #[test]
    fn push_and_drain_preserve_fifo_order() {
        let queue = EventQueue::new(10);
        queue.push(event("first"));
        queue.push(event("second"));
        queue.push(event("third"));

        let drained = queue.drain(10);
        let messages: Vec<_> = drained.iter().map(|p| p.event.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let queue = EventQueue::new(3);
        queue.push(event("a"));
        queue.push(event("b"));
        queue.push(event("c"));

        let evicted = queue.push(event("d"));
        assert_eq!(evicted.map(|p| p.event.message), Some("a".to_string()));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.evicted_total(), 1);

        let messages: Vec<_> =
            queue.drain(10).into_iter().map(|p| p.event.message).collect();
        assert_eq!(messages, vec!["b", "c", "d"]);
    }

    #[test]
    fn drain_respects_batch_limit() {
        let queue = EventQueue::new(10);
        for i in 0..5 {
            queue.push(event(&format!("event-{i}")));
        }

        let batch = queue.drain(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn requeue_front_restores_order_ahead_of_new_events() {
        let queue = EventQueue::new(10);
        queue.push(event("retry-1"));
        queue.push(event("retry-2"));
        let mut batch = queue.drain(2);
        for item in &mut batch {
            item.attempts += 1;
        }

        queue.push(event("fresh"));
        queue.requeue_front(batch);

        let drained = queue.drain(10);
        let messages: Vec<_> = drained.iter().map(|p| p.event.message.as_str()).collect();
        assert_eq!(messages, vec!["retry-1", "retry-2", "fresh"]);
        assert_eq!(drained[0].attempts, 1);
    }

    #[test]
    fn requeue_discards_when_fresh_events_filled_queue() {
        let queue = EventQueue::new(2);
        queue.push(event("retry-1"));
        queue.push(event("retry-2"));
        let batch = queue.drain(2);

        queue.push(event("fresh-1"));
        queue.push(event("fresh-2"));
        queue.requeue_front(batch);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.evicted_total(), 2);
    }

    #[test]
    fn zero_capacity_coerced_to_one() {
        let queue = EventQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(event("only"));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn push_wakes_pending_notified() {
        use std::sync::Arc;

        let queue = Arc::new(EventQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue.notified().await;
                queue.drain(1).len()
            })
        };

        tokio::task::yield_now().await;
        queue.push(event("wake"));

        let drained = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .expect("waiter task should not panic");
        assert_eq!(drained, 1);
    }
}
