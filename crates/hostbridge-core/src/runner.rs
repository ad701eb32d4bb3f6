use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::dispatch::{AppDelegate, DispatchEngine};
use crate::error::{BridgeError, BridgeResult};
use crate::host::RuntimeBridge;
use crate::shared::BridgeShared;

enum Slot {
    Idle(Box<dyn AppDelegate>),
    Running(JoinHandle<Box<dyn AppDelegate>>),
    /// The delegate went down with a panicked or never-spawned thread.
    Lost,
}

/// Lowers the run flag when the engine thread leaves its loop, including by
/// unwinding, so a dead thread is never reported as running.
struct LoopExit(Arc<BridgeShared>);

impl Drop for LoopExit {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!(target: "hostbridge::runner", "engine loop unwound; marking the bridge stopped");
        }
        self.0.running.clear();
        self.0.set_engine_thread(None);
    }
}

/// Owns the dedicated engine thread.
///
/// The app delegate moves into the thread on `start` and comes back out of
/// `join`, so it is only ever touched by one thread at a time.
pub struct EngineRunner {
    shared: Arc<BridgeShared>,
    engine: Arc<DispatchEngine>,
    slot: Slot,
    thread_name: String,
    stack_size: usize,
}

impl EngineRunner {
    pub fn new(
        shared: Arc<BridgeShared>,
        cfg: &EngineConfig,
        host: Option<RuntimeBridge>,
        app: Box<dyn AppDelegate>,
    ) -> Self {
        let engine = Arc::new(DispatchEngine::new(shared.clone(), cfg, host));
        Self {
            shared,
            engine,
            slot: Slot::Idle(app),
            thread_name: cfg.thread_name.clone(),
            stack_size: cfg.stack_size_bytes(),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    #[inline]
    pub fn has_thread(&self) -> bool {
        matches!(self.slot, Slot::Running(_))
    }

    /// Spawn the engine thread. Returns `Ok(false)` if it is already running.
    pub fn start(&mut self) -> BridgeResult<bool> {
        if self.is_running() && self.has_thread() {
            log::debug!(target: "hostbridge::runner", "start ignored: already running");
            return Ok(false);
        }

        self.reap();

        let mut app = match mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Idle(app) => app,
            Slot::Running(h) => {
                self.slot = Slot::Running(h);
                return Ok(false);
            }
            Slot::Lost => {
                return Err(BridgeError::LifecycleMisuse(
                    "engine delegate was lost; the bridge cannot restart".to_string(),
                ))
            }
        };

        self.shared.running.raise();

        let engine = self.engine.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .stack_size(self.stack_size)
            .spawn(move || {
                let _exit = LoopExit(engine.shared().clone());
                engine.shared().set_engine_thread(Some(thread::current().id()));
                engine.run(app.as_mut());
                app
            });

        match spawned {
            Ok(handle) => {
                self.slot = Slot::Running(handle);
                log::info!(target: "hostbridge::runner", "engine thread '{}' started", self.thread_name);
                Ok(true)
            }
            Err(e) => {
                self.shared.running.clear();
                log::error!(target: "hostbridge::runner", "engine thread spawn failed: {e}");
                Err(BridgeError::ThreadSpawn(e))
            }
        }
    }

    /// Clear the run flag, wake the loop and join the thread.
    ///
    /// Called from the engine thread itself this only requests the stop; the
    /// join happens on the next `start`, `stop` or drop from another thread.
    /// Returns true if a thread was joined.
    pub fn stop(&mut self) -> bool {
        if self.shared.is_engine_thread() {
            self.shared.request_stop();
            return false;
        }

        if !self.shared.request_stop() && !self.has_thread() {
            log::debug!(target: "hostbridge::runner", "stop ignored: not running");
            return false;
        }

        self.join()
    }

    /// Join a thread whose loop already exited after an engine-side stop.
    pub fn reap(&mut self) -> bool {
        if self.is_running() || !self.has_thread() || self.shared.is_engine_thread() {
            return false;
        }
        self.join()
    }

    fn join(&mut self) -> bool {
        match mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Running(handle) => {
                match handle.join() {
                    Ok(app) => {
                        self.slot = Slot::Idle(app);
                        log::info!(target: "hostbridge::runner", "engine thread '{}' joined", self.thread_name);
                    }
                    Err(_) => {
                        log::error!(target: "hostbridge::runner", "engine thread '{}' panicked", self.thread_name);
                    }
                }
                true
            }
            other => {
                self.slot = other;
                false
            }
        }
    }
}

impl Drop for EngineRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
