use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative run flag for the engine thread.
///
/// Set by the runner before the thread is spawned, cleared by `stop` or by an
/// engine-originated stop request. Clearing alone does not wake a blocked
/// loop; callers pair it with `EventQueue::wake`.
#[derive(Clone, Debug, Default)]
pub struct RunFlag {
    flag: Arc<AtomicBool>,
}

impl RunFlag {
    #[inline]
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    /// Returns true if the flag was previously cleared.
    #[inline]
    pub fn raise(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Returns true if the flag was previously set.
    #[inline]
    pub fn clear(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
