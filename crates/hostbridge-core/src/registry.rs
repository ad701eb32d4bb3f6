use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::Event;

/// Dispatch target.
///
/// Handlers are invoked only from the engine thread, one event at a time,
/// and must return promptly: there is no forced interruption.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str {
        "handler"
    }

    fn dispatch(&self, event: &Event) -> anyhow::Result<()>;
}

/// Stable identity of a registered handler. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub struct HandlerEntry {
    pub id: HandlerId,
    pub handler: Arc<dyn EventHandler>,
}

/// Immutable view of the registry at one version.
///
/// Iterating a snapshot never holds the registry lock, so handlers may
/// register or unregister while being dispatched to.
#[derive(Clone)]
pub struct RegistrySnapshot {
    version: u64,
    entries: Arc<Vec<HandlerEntry>>,
}

impl RegistrySnapshot {
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerEntry> {
        self.entries.iter()
    }
}

struct Inner {
    version: u64,
    entries: Arc<Vec<HandlerEntry>>,
}

/// Copy-on-write set of dispatch targets, in registration order.
pub struct HandlerRegistry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                version: 0,
                entries: Arc::new(Vec::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock();
        Arc::make_mut(&mut inner.entries).push(HandlerEntry { id, handler });
        inner.version += 1;
        log::debug!(target: "hostbridge::registry", "registered handler {id}");
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        Arc::make_mut(&mut inner.entries).remove(pos);
        inner.version += 1;
        log::debug!(target: "hostbridge::registry", "unregistered handler {id}");
        true
    }

    pub fn get(&self, id: HandlerId) -> Option<Arc<dyn EventHandler>> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.handler.clone())
    }

    #[inline]
    pub fn contains(&self, id: HandlerId) -> bool {
        self.inner.lock().entries.iter().any(|e| e.id == id)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.lock();
        RegistrySnapshot {
            version: inner.version,
            entries: inner.entries.clone(),
        }
    }

    /// Visit every handler registered at call time, without holding the lock.
    pub fn for_each<F: FnMut(HandlerId, &Arc<dyn EventHandler>)>(&self, mut f: F) {
        let snap = self.snapshot();
        for e in snap.iter() {
            f(e.id, &e.handler);
        }
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl EventHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn dispatch(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn names(reg: &HandlerRegistry) -> Vec<String> {
        let mut out = Vec::new();
        reg.for_each(|_, h| out.push(h.name().to_string()));
        out
    }

    #[test]
    fn iteration_follows_registration_order() {
        let reg = HandlerRegistry::new();
        reg.register(Arc::new(Named("a")));
        reg.register(Arc::new(Named("b")));
        reg.register(Arc::new(Named("c")));
        assert_eq!(names(&reg), vec!["a", "b", "c"]);
    }

    #[test]
    fn unregister_removes_only_that_handler() {
        let reg = HandlerRegistry::new();
        let a = reg.register(Arc::new(Named("a")));
        let b = reg.register(Arc::new(Named("b")));

        assert!(reg.unregister(a));
        assert!(!reg.unregister(a));
        assert!(!reg.contains(a));
        assert!(reg.contains(b));
        assert_eq!(names(&reg), vec!["b"]);
    }

    #[test]
    fn ids_are_not_reused() {
        let reg = HandlerRegistry::new();
        let a = reg.register(Arc::new(Named("a")));
        reg.unregister(a);
        let b = reg.register(Arc::new(Named("b")));
        assert_ne!(a, b);
        assert!(reg.get(a).is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let reg = HandlerRegistry::new();
        let a = reg.register(Arc::new(Named("a")));
        let snap = reg.snapshot();

        reg.register(Arc::new(Named("b")));
        reg.unregister(a);

        assert_eq!(snap.len(), 1);
        assert_eq!(snap.iter().next().map(|e| e.id), Some(a));
        assert!(reg.version() > snap.version());
    }

    #[test]
    fn registering_from_inside_for_each_does_not_deadlock() {
        let reg = HandlerRegistry::new();
        reg.register(Arc::new(Named("a")));

        let mut visited = 0;
        reg.for_each(|_, _| {
            visited += 1;
            reg.register(Arc::new(Named("late")));
        });

        assert_eq!(visited, 1);
        assert_eq!(reg.len(), 2);
    }
}
