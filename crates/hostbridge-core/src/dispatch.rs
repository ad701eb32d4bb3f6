use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, ShutdownPolicy};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{Event, EventEnvelope, Message};
use crate::host::{HostContext, RuntimeBridge};
use crate::registry::{EventHandler, HandlerId};
use crate::shared::BridgeShared;

/// Application-level step that runs on the engine thread.
///
/// Owned by the engine thread while the loop runs and handed back on join.
pub trait AppDelegate: Send {
    fn id(&self) -> &'static str {
        "app"
    }

    fn on_loop_start(&mut self) {}

    /// First refusal on untargeted events. Returning true consumes the event
    /// and suppresses the broadcast.
    fn app_dispatch(&mut self, _event: &Event) -> bool {
        false
    }

    /// Called once per loop iteration after the batch is dispatched.
    fn idle(&mut self) {}

    fn on_loop_exit(&mut self) {}
}

/// Delegate that consumes nothing.
#[derive(Debug, Default)]
pub struct PassThroughApp;

impl AppDelegate for PassThroughApp {}

/// Consumes `StartupScript` by running the startup callback; everything else
/// is broadcast.
pub struct StartupScriptApp<F: FnMut(&Event) + Send> {
    on_startup: F,
}

impl<F: FnMut(&Event) + Send> StartupScriptApp<F> {
    pub fn new(on_startup: F) -> Self {
        Self { on_startup }
    }
}

impl<F: FnMut(&Event) + Send> AppDelegate for StartupScriptApp<F> {
    fn id(&self) -> &'static str {
        "startup-script"
    }

    fn app_dispatch(&mut self, event: &Event) -> bool {
        if event.message == Message::StartupScript {
            (self.on_startup)(event);
            return true;
        }
        false
    }
}

/// The engine-thread run loop.
pub struct DispatchEngine {
    shared: Arc<BridgeShared>,
    policy: ShutdownPolicy,
    idle: Option<Duration>,
    host: Option<RuntimeBridge>,
}

impl DispatchEngine {
    pub fn new(shared: Arc<BridgeShared>, cfg: &EngineConfig, host: Option<RuntimeBridge>) -> Self {
        Self {
            shared,
            policy: cfg.shutdown_policy,
            idle: cfg.idle_interval(),
            host,
        }
    }

    #[inline]
    pub fn shared(&self) -> &Arc<BridgeShared> {
        &self.shared
    }

    /// Run until the run flag is cleared.
    ///
    /// Per iteration: drain the queue, dispatch in FIFO order, run idle work,
    /// then block until woken, stopped, or the idle interval elapses.
    pub fn run(&self, app: &mut dyn AppDelegate) {
        let _host = self.attach_host();
        log::info!(target: "hostbridge::dispatch", "loop start (app={})", app.id());
        guarded(app.id(), "on_loop_start", || app.on_loop_start());

        while self.shared.running.is_set() {
            let mut batch = self.shared.queue.drain_all().into_iter();
            while let Some(env) = batch.next() {
                if self.policy == ShutdownPolicy::Discard && !self.shared.running.is_set() {
                    self.discard(std::iter::once(env).chain(batch.by_ref()));
                    break;
                }
                self.dispatch_one(app, env);
            }

            guarded(app.id(), "idle", || app.idle());
            self.shared.stats.add_wake_cycles(1);

            self.shared.queue.wait_for_work(&self.shared.running, self.idle);
        }

        self.finish(app);
        guarded(app.id(), "on_loop_exit", || app.on_loop_exit());
        log::info!(target: "hostbridge::dispatch", "loop exit");
    }

    /// One synchronous pass on the calling thread: drain, dispatch everything,
    /// idle. Returns the number of envelopes processed.
    pub fn pump(&self, app: &mut dyn AppDelegate) -> usize {
        let batch = self.shared.queue.drain_all();
        let n = batch.len();
        for env in batch {
            self.dispatch_one(app, env);
        }
        guarded(app.id(), "idle", || app.idle());
        n
    }

    /// Route a single envelope and return its event to the pool.
    pub fn dispatch_one(&self, app: &mut dyn AppDelegate, env: EventEnvelope) {
        let EventEnvelope { target, event } = env;
        self.shared.stats.add_dispatched(1);
        log::trace!(target: "hostbridge::dispatch", "dispatch {:?} -> {:?}", event.message, target);

        match target {
            Some(id) => match self.shared.registry.get(id) {
                Some(handler) => self.deliver(id, handler.as_ref(), &event),
                None => {
                    self.shared.stats.add_targeted_misses(1);
                    let miss = BridgeError::HandlerLookupMiss(id);
                    let level = if miss.is_silent() {
                        log::Level::Debug
                    } else {
                        log::Level::Warn
                    };
                    log::log!(target: "hostbridge::dispatch", level, "dropped {:?}: {miss}", event.message);
                }
            },
            None => {
                if self.offer_to_app(app, &event) {
                    self.shared.stats.add_app_consumed(1);
                } else {
                    let snap = self.shared.registry.snapshot();
                    for entry in snap.iter() {
                        self.deliver(entry.id, entry.handler.as_ref(), &event);
                    }
                }
            }
        }

        self.shared.pool.release(event);
    }

    fn offer_to_app(&self, app: &mut dyn AppDelegate, event: &Event) -> bool {
        match catch_unwind(AssertUnwindSafe(|| app.app_dispatch(event))) {
            Ok(consumed) => consumed,
            Err(payload) => {
                self.shared.stats.add_handler_failures(1);
                log::error!(
                    target: "hostbridge::dispatch",
                    "app step [{}] panicked on {:?}: {}",
                    app.id(),
                    event.message,
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }

    fn deliver(&self, id: HandlerId, handler: &dyn EventHandler, event: &Event) {
        match invoke_handler(handler, event) {
            Ok(()) => self.shared.stats.add_delivered(1),
            Err(e) => {
                self.shared.stats.add_handler_failures(1);
                log::error!(target: "hostbridge::dispatch", "handler {id} on {:?}: {e}", event.message);
            }
        }
    }

    fn discard<I: Iterator<Item = EventEnvelope>>(&self, envs: I) {
        let mut n = 0u64;
        self.shared.pool.release_all(envs.map(|e| {
            n += 1;
            e.event
        }));
        if n > 0 {
            self.shared.stats.add_discarded(n);
            log::debug!(target: "hostbridge::dispatch", "discarded {n} events on stop");
        }
    }

    fn finish(&self, app: &mut dyn AppDelegate) {
        match self.policy {
            ShutdownPolicy::Discard => {
                self.shared.discard_pending();
            }
            ShutdownPolicy::Drain => {
                let n = self.pump(app);
                log::debug!(target: "hostbridge::dispatch", "drained {n} events on stop");
            }
        }
    }

    fn attach_host(&self) -> Option<HostContext<'_>> {
        let bridge = self.host.as_ref()?;
        match bridge.attach() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                log::warn!(target: "hostbridge::dispatch", "engine thread runs without host context: {e}");
                None
            }
        }
    }
}

/// Call a handler, turning both errors and panics into a `BridgeError`.
pub fn invoke_handler(handler: &dyn EventHandler, event: &Event) -> BridgeResult<()> {
    match catch_unwind(AssertUnwindSafe(|| handler.dispatch(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(BridgeError::HandlerDispatch {
            handler: handler.name().to_string(),
            source,
        }),
        Err(payload) => Err(BridgeError::HandlerPanicked {
            handler: handler.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn guarded<F: FnOnce()>(who: &str, step: &str, f: F) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        log::error!(target: "hostbridge::dispatch", "[{who}] {step} panicked: {}", panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        seen: Mutex<Vec<Message>>,
    }

    impl Recorder {
        fn named(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<Message> {
            self.seen.lock().clone()
        }
    }

    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
            self.seen.lock().push(event.message);
            Ok(())
        }
    }

    struct Failing;

    impl EventHandler for Failing {
        fn dispatch(&self, _event: &Event) -> anyhow::Result<()> {
            anyhow::bail!("refused")
        }
    }

    struct Panicking;

    impl EventHandler for Panicking {
        fn dispatch(&self, _event: &Event) -> anyhow::Result<()> {
            panic!("handler blew up")
        }
    }

    fn engine() -> DispatchEngine {
        DispatchEngine::new(
            Arc::new(BridgeShared::new(0)),
            &EngineConfig::default(),
            None,
        )
    }

    #[test]
    fn targeted_miss_is_silent_and_does_not_broadcast() {
        let eng = engine();
        let sh = eng.shared().clone();
        let a = Recorder::named("a");
        let a_id = sh.registry.register(a.clone());
        let gone = sh.registry.register(Recorder::named("gone"));
        sh.registry.unregister(gone);
        let version = sh.registry.version();

        sh.post(Message::Custom(1), 0, 0, Some(gone));
        eng.pump(&mut PassThroughApp);

        assert!(a.seen().is_empty());
        assert_eq!(sh.stats.snapshot().targeted_misses, 1);
        assert_eq!(sh.registry.version(), version);
        assert!(sh.registry.contains(a_id));
    }

    #[test]
    fn app_step_consumes_startup_script() {
        let eng = engine();
        let sh = eng.shared().clone();
        let a = Recorder::named("a");
        sh.registry.register(a.clone());

        let mut ran = 0;
        let mut app = StartupScriptApp::new(|_: &Event| ran += 1);
        sh.post(Message::StartupScript, 0, 0, None);
        sh.post(Message::Custom(5), 0, 0, None);
        eng.pump(&mut app);
        drop(app);

        assert_eq!(ran, 1);
        assert_eq!(a.seen(), vec![Message::Custom(5)]);
        assert_eq!(sh.stats.snapshot().app_consumed, 1);
    }

    #[test]
    fn failing_handler_does_not_stop_broadcast() {
        let eng = engine();
        let sh = eng.shared().clone();
        sh.registry.register(Arc::new(Failing));
        sh.registry.register(Arc::new(Panicking));
        let c = Recorder::named("c");
        sh.registry.register(c.clone());

        sh.post(Message::Custom(1), 0, 0, None);
        sh.post(Message::Custom(2), 0, 0, None);
        assert_eq!(eng.pump(&mut PassThroughApp), 2);

        assert_eq!(c.seen(), vec![Message::Custom(1), Message::Custom(2)]);
        let stats = sh.stats.snapshot();
        assert_eq!(stats.handler_failures, 4);
        assert_eq!(stats.delivered, 2);
    }

    #[test]
    fn invoke_handler_classifies_errors() {
        let ev = Event::default();
        assert!(matches!(
            invoke_handler(&Failing, &ev),
            Err(BridgeError::HandlerDispatch { .. })
        ));
        match invoke_handler(&Panicking, &ev) {
            Err(BridgeError::HandlerPanicked { message, .. }) => {
                assert_eq!(message, "handler blew up")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dispatched_events_return_to_pool() {
        let eng = engine();
        let sh = eng.shared().clone();
        sh.registry.register(Recorder::named("a"));

        for i in 0..50 {
            sh.post(Message::Custom(i), 0, 0, None);
            eng.pump(&mut PassThroughApp);
        }

        assert_eq!(sh.pool.created(), 1);
        assert_eq!(sh.pool.available(), 1);
    }
}
