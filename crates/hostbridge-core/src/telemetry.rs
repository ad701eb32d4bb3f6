use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Loop counters, written by producers and the engine thread, read from anywhere.
#[derive(Default)]
pub struct LoopStats {
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    app_consumed: AtomicU64,
    targeted_misses: AtomicU64,
    handler_failures: AtomicU64,
    discarded: AtomicU64,
    wake_cycles: AtomicU64,
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub app_consumed: u64,
    pub targeted_misses: u64,
    pub handler_failures: u64,
    pub discarded: u64,
    pub wake_cycles: u64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $name(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    bump! {
        add_enqueued => enqueued,
        add_dispatched => dispatched,
        add_delivered => delivered,
        add_app_consumed => app_consumed,
        add_targeted_misses => targeted_misses,
        add_handler_failures => handler_failures,
        add_discarded => discarded,
        add_wake_cycles => wake_cycles,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            app_consumed: self.app_consumed.load(Ordering::Relaxed),
            targeted_misses: self.targeted_misses.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            wake_cycles: self.wake_cycles.load(Ordering::Relaxed),
        }
    }
}
