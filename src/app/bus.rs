// logpulse - app/bus.rs
//
// Bounded event bus between the watch adapter and the worker pool.
//
// Overflow policy is drop-newest: a full queue discards the incoming item
// and counts the drop, so already-accepted events (which may be in flight
// on a worker) are never invalidated and the publisher never blocks.
//
// Stop semantics: `stop` drops the internal sender. Consumers blocked in
// `try_dequeue` wake as soon as the channel is disconnected and empty, and
// the remaining queued items stay receivable, so shutdown drains cleanly.
// Publishing after stop returns false without counting a drop; stopping
// is not overflow.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bounded FIFO queue with drop-newest overflow and counted drops.
pub struct EventBus<T> {
    /// Taken (dropped) on stop; publish fails cleanly afterwards.
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<T> EventBus<T> {
    /// Create a bus with the given capacity. Capacity must be non-zero;
    /// the CLI layer validates user input before construction.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bus capacity must be > 0");
        let (sender, receiver) = bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            capacity,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking publish. Returns true iff the item was enqueued.
    ///
    /// A full queue drops the item and increments the drop counter. A
    /// stopped bus returns false without counting.
    pub fn publish(&self, item: T) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(item) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            // The bus owns the receiver for its whole lifetime, so the
            // channel cannot disconnect while a sender exists.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Consume one item.
    ///
    /// A zero timeout polls and returns immediately. A positive timeout
    /// blocks up to that long on crossbeam's monotonic deadline, so
    /// wall-clock adjustments cannot stretch or shrink the wait. Returns
    /// `None` on timeout, or when the bus is stopped and fully drained.
    pub fn try_dequeue(&self, timeout: Duration) -> Option<T> {
        if timeout.is_zero() {
            self.receiver.try_recv().ok()
        } else {
            self.receiver.recv_timeout(timeout).ok()
        }
    }

    /// Stop the bus. Idempotent. Wakes all blocked consumers once the
    /// queue is drained and makes subsequent publishes return false.
    pub fn stop(&self) {
        self.sender.lock().take();
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Items accepted since construction.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Items discarded by overflow since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Snapshot of the current queue depth.
    pub fn depth(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
