use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::event::EventEnvelope;
use crate::sync::RunFlag;

/// Unbounded FIFO of envelopes, the single hand-off point between host
/// producers and the engine thread.
///
/// Producers never block beyond the push critical section. The consumer takes
/// everything at once with `drain_all` and parks in `wait_for_work` when
/// there is nothing left.
pub struct EventQueue {
    items: Mutex<VecDeque<EventEnvelope>>,
    wake: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
        }
    }

    /// Append to the tail and signal the consumer once.
    pub fn enqueue(&self, env: EventEnvelope) {
        self.items.lock().push_back(env);
        self.wake.notify_one();
    }

    /// Remove and return every queued envelope in FIFO order.
    pub fn drain_all(&self) -> Vec<EventEnvelope> {
        let mut items = self.items.lock();
        items.drain(..).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wake a consumer blocked in `wait_for_work`.
    ///
    /// Takes the lock so a waiter that has just checked the run flag cannot
    /// miss the notification.
    pub fn wake(&self) {
        let _items = self.items.lock();
        self.wake.notify_all();
    }

    /// Block until the queue is non-empty, `running` is cleared, or the idle
    /// interval elapses. `None` waits without a deadline.
    ///
    /// Returns true if there is work queued.
    pub fn wait_for_work(&self, running: &RunFlag, idle: Option<Duration>) -> bool {
        let mut items = self.items.lock();
        match idle {
            None => {
                while items.is_empty() && running.is_set() {
                    self.wake.wait(&mut items);
                }
            }
            Some(interval) => {
                let deadline = Instant::now() + interval;
                while items.is_empty() && running.is_set() {
                    if self.wake.wait_until(&mut items, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        !items.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
