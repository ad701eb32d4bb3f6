use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};

use crate::event::{Event, EventEnvelope, Message};
use crate::lifecycle::LifecycleState;
use crate::pool::EventPool;
use crate::queue::EventQueue;
use crate::registry::{HandlerId, HandlerRegistry};
use crate::sync::RunFlag;
use crate::telemetry::LoopStats;

/// State reachable from host threads and the engine thread alike.
///
/// Pool, queue and registry each carry their own lock; nothing here spans
/// more than one of them.
pub struct BridgeShared {
    pub pool: EventPool,
    pub queue: EventQueue,
    pub registry: HandlerRegistry,
    pub stats: LoopStats,
    pub(crate) running: RunFlag,
    main_window: RwLock<Option<HandlerId>>,
    engine_thread: Mutex<Option<ThreadId>>,
    state: AtomicU8,
}

impl BridgeShared {
    pub fn new(pool_prewarm: usize) -> Self {
        Self {
            pool: EventPool::with_prewarm(pool_prewarm),
            queue: EventQueue::new(),
            registry: HandlerRegistry::new(),
            stats: LoopStats::new(),
            running: RunFlag::new(),
            main_window: RwLock::new(None),
            engine_thread: Mutex::new(None),
            state: AtomicU8::new(LifecycleState::Created as u8),
        }
    }

    /// Fire-and-forget: copy into a pooled event and enqueue.
    pub fn post(&self, message: Message, wparam: u64, lparam: u64, target: Option<HandlerId>) {
        let mut ev = self.pool.acquire();
        ev.fill(message, wparam, lparam, None);
        self.enqueue(ev, target);
    }

    pub fn post_event(&self, event: &Event, target: Option<HandlerId>) {
        let mut ev = self.pool.acquire();
        *ev = *event;
        self.enqueue(ev, target);
    }

    /// Route to the main window when one is designated, otherwise untargeted.
    pub fn post_to_main(&self, event: &Event) {
        let target = self.main_window();
        self.post_event(event, target);
    }

    fn enqueue(&self, ev: Box<Event>, target: Option<HandlerId>) {
        log::trace!(target: "hostbridge::queue", "enqueue {:?} -> {:?}", ev.message, target);
        self.queue.enqueue(EventEnvelope::new(ev, target));
        self.stats.add_enqueued(1);
    }

    /// Drop everything queued, returning the events to the pool.
    pub fn discard_pending(&self) -> usize {
        let pending = self.queue.drain_all();
        let n = pending.len();
        if n > 0 {
            self.pool.release_all(pending.into_iter().map(|e| e.event));
            self.stats.add_discarded(n as u64);
            log::debug!(target: "hostbridge::queue", "discarded {n} pending events");
        }
        n
    }

    #[inline]
    pub fn main_window(&self) -> Option<HandlerId> {
        *self.main_window.read()
    }

    /// Take the main window slot. Returns the current holder on conflict.
    pub(crate) fn claim_main_window(&self, id: HandlerId) -> Result<(), HandlerId> {
        let mut mw = self.main_window.write();
        match *mw {
            Some(cur) if cur != id => Err(cur),
            _ => {
                *mw = Some(id);
                Ok(())
            }
        }
    }

    pub(crate) fn clear_main_window(&self) -> Option<HandlerId> {
        self.main_window.write().take()
    }

    pub(crate) fn clear_main_window_if(&self, id: HandlerId) -> bool {
        let mut mw = self.main_window.write();
        if *mw == Some(id) {
            *mw = None;
            return true;
        }
        false
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.is_set()
    }

    /// Clear the run flag and wake the loop. Never blocks on the engine thread.
    ///
    /// Returns false if the loop was not running.
    pub fn request_stop(&self) -> bool {
        let was = self.running.clear();
        self.queue.wake();
        was
    }

    pub fn is_engine_thread(&self) -> bool {
        *self.engine_thread.lock() == Some(thread::current().id())
    }

    pub(crate) fn set_engine_thread(&self, id: Option<ThreadId>) {
        *self.engine_thread.lock() = id;
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn store_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for BridgeShared {
    fn default() -> Self {
        Self::new(0)
    }
}
