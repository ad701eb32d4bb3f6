use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::dispatch::{AppDelegate, PassThroughApp};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{Event, Message, Touch};
use crate::host::{HostRuntime, HostServices, RuntimeBridge};
use crate::lifecycle::{HostCommand, LifecycleController, LifecycleHooks, LifecycleState, NoHooks};
use crate::registry::{EventHandler, HandlerId};
use crate::runner::EngineRunner;
use crate::shared::BridgeShared;
use crate::telemetry::StatsSnapshot;

pub struct BridgeBuilder {
    config: BridgeConfig,
    app: Option<Box<dyn AppDelegate>>,
    hooks: Option<Box<dyn LifecycleHooks>>,
    host: Option<Arc<dyn HostRuntime>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            app: None,
            hooks: None,
            host: None,
        }
    }

    pub fn app(mut self, app: impl AppDelegate + 'static) -> Self {
        self.app = Some(Box::new(app));
        self
    }

    pub fn hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    pub fn host_runtime(mut self, runtime: Arc<dyn HostRuntime>) -> Self {
        self.host = Some(runtime);
        self
    }

    pub fn build(self) -> Bridge {
        let shared = Arc::new(BridgeShared::new(self.config.engine.pool_prewarm));
        let host = self.host.map(RuntimeBridge::new);
        let app = self.app.unwrap_or_else(|| Box::new(PassThroughApp));
        let hooks = self.hooks.unwrap_or_else(|| Box::new(NoHooks));

        let runner = EngineRunner::new(shared.clone(), &self.config.engine, host.clone(), app);
        let controller = LifecycleController::new(shared.clone(), runner, hooks);

        log::debug!(
            target: "hostbridge::bridge",
            "bridge built (policy={:?}, host={})",
            self.config.engine.shutdown_policy,
            host.is_some()
        );

        Bridge {
            shared,
            controller: Mutex::new(controller),
            host: host.map(HostServices::new),
            project_path: Mutex::new(None),
            config: self.config,
        }
    }
}

/// The owned application context: one per process, constructed at entry and
/// torn down with [`Bridge::shutdown`] (or drop).
///
/// Every method is callable from any host thread. Lifecycle calls made from
/// the engine thread never block on it: stop requests are forwarded to the
/// run flag, anything that would start or join the thread is refused.
pub struct Bridge {
    shared: Arc<BridgeShared>,
    controller: Mutex<LifecycleController>,
    host: Option<HostServices>,
    project_path: Mutex<Option<PathBuf>>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn builder(config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder::new(config)
    }

    #[inline]
    pub fn shared(&self) -> &Arc<BridgeShared> {
        &self.shared
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        let name = handler.name().to_string();
        let id = self.shared.registry.register(handler);
        log::debug!(target: "hostbridge::bridge", "registered handler [{name}] as {id}");
        id
    }

    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        if self.shared.clear_main_window_if(id) {
            log::debug!(target: "hostbridge::bridge", "main window {id} cleared on unregister");
        }
        self.shared.registry.unregister(id)
    }

    /// Designate the handler that receives host messages without an explicit target.
    pub fn set_main_window(&self, id: HandlerId) -> BridgeResult<()> {
        if !self.shared.registry.contains(id) {
            return Err(BridgeError::HandlerLookupMiss(id));
        }
        self.shared.claim_main_window(id).map_err(|cur| {
            BridgeError::LifecycleMisuse(format!("main window already set to {cur}"))
        })
    }

    pub fn clear_main_window(&self) -> Option<HandlerId> {
        self.shared.clear_main_window()
    }

    #[inline]
    pub fn main_window(&self) -> Option<HandlerId> {
        self.shared.main_window()
    }

    /// Fire-and-forget post. Safe before the engine thread starts: the
    /// envelope waits in the queue.
    pub fn post(&self, message: Message, wparam: u64, lparam: u64, target: Option<HandlerId>) {
        self.shared.post(message, wparam, lparam, target);
    }

    /// Host message entry point.
    ///
    /// Lifecycle messages go through the lifecycle controller, the startup
    /// trigger is always untargeted, everything else goes to the main window.
    pub fn send_message(&self, code: i32, wparam: i64, lparam: i64) -> BridgeResult<()> {
        let message = Message::from_code(code);
        if let Some(cmd) = HostCommand::from_message(message) {
            self.command(cmd, wparam as u64, lparam as u64)?;
            return Ok(());
        }

        let ev = Event::new(message, wparam as u64, lparam as u64);
        match message {
            Message::StartupScript => self.shared.post_event(&ev, None),
            _ => self.shared.post_to_main(&ev),
        }
        Ok(())
    }

    /// Touch entry point. Kinds outside 0..=2 are ignored; returns whether
    /// an event was posted.
    pub fn send_touch(&self, kind: i32, x: f32, y: f32, contact: f32, pointer_id: i32, tick: i64) -> bool {
        let Some(phase) = Touch::message_for_kind(kind) else {
            log::debug!(target: "hostbridge::bridge", "touch kind {kind} ignored");
            return false;
        };

        let mut ev = Event::default();
        Touch {
            phase,
            x,
            y,
            contact,
            pointer_id,
            tick,
        }
        .write_into(&mut ev);
        self.shared.post_to_main(&ev);
        true
    }

    /// Apply a host lifecycle command.
    pub fn on_command(&self, cmd: HostCommand) -> BridgeResult<LifecycleState> {
        self.command(cmd, 0, 0)
    }

    fn command(&self, cmd: HostCommand, wparam: u64, lparam: u64) -> BridgeResult<LifecycleState> {
        if self.shared.is_engine_thread() {
            return match cmd {
                HostCommand::Destroy => {
                    self.shared.request_stop();
                    Ok(self.shared.state())
                }
                _ => Err(BridgeError::LifecycleMisuse(format!(
                    "{cmd:?} issued from the engine thread"
                ))),
            };
        }
        self.controller.lock().apply(cmd, wparam, lparam)
    }

    /// Record the project to run, queue the startup trigger and make sure the
    /// engine thread is up.
    pub fn set_startup_path(&self, path: impl AsRef<Path>) -> BridgeResult<()> {
        if self.shared.is_engine_thread() {
            return Err(BridgeError::LifecycleMisuse(
                "startup path set from the engine thread".to_string(),
            ));
        }

        let mut ctl = self.controller.lock();
        ctl.check_startable()?;

        let path = path.as_ref().to_path_buf();
        log::info!(target: "hostbridge::bridge", "startup path {}", path.display());
        *self.project_path.lock() = Some(path);

        ctl.set_project_selected(true);
        self.shared.post(Message::StartupScript, 0, 0, None);
        ctl.ensure_running()
    }

    pub fn project_path(&self) -> Option<PathBuf> {
        self.project_path.lock().clone()
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Blocking stop without destroying the bridge. Returns true if a thread
    /// was joined. From the engine thread this only requests the stop.
    pub fn stop_engine(&self) -> bool {
        if self.shared.is_engine_thread() {
            self.shared.request_stop();
            return false;
        }
        self.controller.lock().stop_engine()
    }

    /// Non-blocking stop request, callable from any thread including the
    /// engine thread.
    pub fn request_stop(&self) -> bool {
        self.shared.request_stop()
    }

    /// Ask the host to finish, then stop the engine thread.
    ///
    /// The thread is stopped even when the host call fails.
    pub fn finish_activity(&self) -> BridgeResult<()> {
        let finished = match &self.host {
            Some(h) => h.request_finish(),
            None => Err(BridgeError::BridgeUnavailable(
                "no host runtime configured".to_string(),
            )),
        };
        self.stop_engine();
        finished
    }

    #[inline]
    pub fn host_services(&self) -> Option<&HostServices> {
        self.host.as_ref()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Destroy: stop and join the engine thread, discard whatever is left.
    pub fn shutdown(&self) -> BridgeResult<LifecycleState> {
        self.on_command(HostCommand::Destroy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    struct Nop;

    impl EventHandler for Nop {
        fn dispatch(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn bridge() -> Bridge {
        let config = BridgeConfig {
            engine: EngineConfig {
                idle_interval_ms: 0,
                ..EngineConfig::default()
            },
            ..BridgeConfig::default()
        };
        Bridge::builder(config).build()
    }

    #[test]
    fn second_main_window_is_misuse() {
        let b = bridge();
        let a = b.register_handler(Arc::new(Nop));
        let c = b.register_handler(Arc::new(Nop));

        b.set_main_window(a).unwrap();
        b.set_main_window(a).unwrap();
        assert!(matches!(
            b.set_main_window(c),
            Err(BridgeError::LifecycleMisuse(_))
        ));

        assert!(b.unregister_handler(a));
        assert_eq!(b.main_window(), None);
        b.set_main_window(c).unwrap();
    }

    #[test]
    fn unregistered_main_window_is_lookup_miss() {
        let b = bridge();
        let a = b.register_handler(Arc::new(Nop));
        b.unregister_handler(a);
        assert!(matches!(
            b.set_main_window(a),
            Err(BridgeError::HandlerLookupMiss(_))
        ));
    }

    #[test]
    fn unknown_touch_kind_is_ignored() {
        let b = bridge();
        assert!(!b.send_touch(7, 0.0, 0.0, 0.0, 0, 0));
        assert!(b.shared().queue.is_empty());
        assert!(b.send_touch(1, 0.0, 0.0, 0.0, 0, 0));
        assert_eq!(b.shared().queue.len(), 1);
    }

    #[test]
    fn start_and_restart_are_not_queued() {
        let b = bridge();
        b.send_message(Message::Start.code(), 0, 0).unwrap();
        b.send_message(Message::Restart.code(), 0, 0).unwrap();
        assert!(b.shared().queue.is_empty());

        b.send_message(Message::Pause.code(), 0, 0).unwrap();
        assert_eq!(b.shared().queue.len(), 1);
    }

    #[test]
    fn finish_without_host_is_unavailable() {
        let b = bridge();
        assert!(matches!(
            b.finish_activity(),
            Err(BridgeError::BridgeUnavailable(_))
        ));
    }

    #[test]
    fn shutdown_is_terminal() {
        let b = bridge();
        b.set_startup_path("/tmp/project").unwrap();
        assert!(b.is_running());

        assert_eq!(b.shutdown().unwrap(), LifecycleState::Destroyed);
        assert!(!b.is_running());
        assert_eq!(b.on_command(HostCommand::Resume).unwrap(), LifecycleState::Destroyed);
        assert!(!b.is_running());
    }
}
