use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::event::Event;

/// Free list of boxed events.
///
/// Hot-path producers take an event with `acquire`, fill it and hand it to the
/// queue; the engine thread gives it back with `release` after dispatch.
/// Reuse order is LIFO and not part of the contract.
pub struct EventPool {
    free: Mutex<Vec<Box<Event>>>,
    created: AtomicUsize,
}

impl EventPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Pool with `n` events allocated up front.
    pub fn with_prewarm(n: usize) -> Self {
        let pool = Self::new();
        {
            let mut free = pool.free.lock();
            free.reserve(n);
            for _ in 0..n {
                free.push(Box::default());
            }
        }
        pool.created.store(n, Ordering::Relaxed);
        pool
    }

    /// Take a cleared event, recycling one when available.
    pub fn acquire(&self) -> Box<Event> {
        if let Some(mut ev) = self.free.lock().pop() {
            ev.reset();
            return ev;
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Box::default()
    }

    #[inline]
    pub fn release(&self, ev: Box<Event>) {
        self.free.lock().push(ev);
    }

    pub fn release_all<I: IntoIterator<Item = Box<Event>>>(&self, evs: I) {
        let mut free = self.free.lock();
        free.extend(evs);
    }

    /// Total events ever allocated by this pool.
    #[inline]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new()
    }
}
