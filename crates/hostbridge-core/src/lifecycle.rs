use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::event::{Event, Message};
use crate::runner::EngineRunner;
use crate::shared::BridgeShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    WindowReady = 1,
    Running = 2,
    Paused = 3,
    Stopping = 4,
    Destroyed = 5,
}

impl LifecycleState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => LifecycleState::WindowReady,
            2 => LifecycleState::Running,
            3 => LifecycleState::Paused,
            4 => LifecycleState::Stopping,
            5 => LifecycleState::Destroyed,
            _ => LifecycleState::Created,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Commands originating from the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    WindowCreated,
    WindowDestroyed,
    WindowResized,
    WindowRedrawNeeded,
    ContentRectChanged,
    GainedFocus,
    LostFocus,
    InputChanged,
    ConfigChanged,
    LowMemory,
    SaveState,
    Start,
    Restart,
    Resume,
    Pause,
    Stop,
    Destroy,
}

impl HostCommand {
    /// Host messages that carry lifecycle meaning.
    pub fn from_message(m: Message) -> Option<Self> {
        Some(match m {
            Message::Start => HostCommand::Start,
            Message::Restart => HostCommand::Restart,
            Message::Resume => HostCommand::Resume,
            Message::Pause => HostCommand::Pause,
            Message::Stop => HostCommand::Stop,
            Message::Destroy => HostCommand::Destroy,
            Message::SurfaceCreated => HostCommand::WindowCreated,
            Message::SurfaceChanged => HostCommand::WindowResized,
            Message::SurfaceDestroyed => HostCommand::WindowDestroyed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAction {
    None,
    Start,
    Stop,
}

/// Outcome of one command in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub accepted: bool,
    pub next: Option<LifecycleState>,
    pub post: Option<Message>,
    pub thread: ThreadAction,
}

impl Transition {
    const IGNORED: Transition = Transition {
        accepted: false,
        next: None,
        post: None,
        thread: ThreadAction::None,
    };

    const LOCAL: Transition = Transition {
        accepted: true,
        ..Self::IGNORED
    };

    const fn posting(m: Message) -> Self {
        Transition {
            post: Some(m),
            ..Self::LOCAL
        }
    }

    const fn to(self, s: LifecycleState) -> Self {
        Transition {
            next: Some(s),
            ..self
        }
    }

    const fn with_thread(self, thread: ThreadAction) -> Self {
        Transition { thread, ..self }
    }
}

/// The lifecycle transition table.
///
/// Pure: no side effects, so every edge is testable in isolation.
pub fn transition(state: LifecycleState, cmd: HostCommand, project_selected: bool) -> Transition {
    use HostCommand as C;
    use LifecycleState as S;

    if matches!(state, S::Stopping | S::Destroyed) {
        return Transition::IGNORED;
    }

    match cmd {
        C::WindowCreated => {
            let t = Transition::posting(Message::SurfaceCreated);
            if state == S::Created {
                t.to(S::WindowReady)
            } else {
                t
            }
        }
        C::WindowDestroyed => {
            let t = Transition::posting(Message::SurfaceDestroyed);
            if state == S::WindowReady {
                t.to(S::Created)
            } else {
                t
            }
        }
        C::WindowResized => Transition::posting(Message::SurfaceChanged),
        C::WindowRedrawNeeded
        | C::ContentRectChanged
        | C::GainedFocus
        | C::LostFocus
        | C::InputChanged
        | C::ConfigChanged
        | C::LowMemory
        | C::SaveState
        | C::Start
        | C::Restart => Transition::LOCAL,
        C::Resume => {
            let t = Transition::posting(Message::Resume);
            if project_selected {
                t.to(S::Running).with_thread(ThreadAction::Start)
            } else {
                t
            }
        }
        C::Pause => {
            let t = Transition::posting(Message::Pause);
            if state == S::Running {
                t.to(S::Paused)
            } else {
                t
            }
        }
        C::Stop => Transition::posting(Message::Stop),
        C::Destroy => Transition::LOCAL
            .to(S::Destroyed)
            .with_thread(ThreadAction::Stop),
    }
}

/// Hooks for the window/rendering subsystem. All default to no-ops.
pub trait LifecycleHooks: Send {
    fn on_command(&mut self, _cmd: HostCommand, _state: LifecycleState) {}

    fn on_state_changed(&mut self, _from: LifecycleState, _to: LifecycleState) {}
}

#[derive(Debug, Default)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// Applies host commands: transition table, posted events, engine thread.
///
/// Lives behind a host-side lock; the engine thread never calls into it.
pub struct LifecycleController {
    shared: Arc<BridgeShared>,
    runner: EngineRunner,
    hooks: Box<dyn LifecycleHooks>,
    state: LifecycleState,
    project_selected: bool,
    has_window: bool,
}

impl LifecycleController {
    pub fn new(shared: Arc<BridgeShared>, runner: EngineRunner, hooks: Box<dyn LifecycleHooks>) -> Self {
        shared.store_state(LifecycleState::Created);
        Self {
            shared,
            runner,
            hooks,
            state: LifecycleState::Created,
            project_selected: false,
            has_window: false,
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    #[inline]
    pub fn project_selected(&self) -> bool {
        self.project_selected
    }

    pub fn set_project_selected(&mut self, selected: bool) {
        self.project_selected = selected;
    }

    /// Apply one host command. `wparam`/`lparam` are carried into the posted
    /// event unchanged.
    pub fn apply(&mut self, cmd: HostCommand, wparam: u64, lparam: u64) -> BridgeResult<LifecycleState> {
        self.reconcile();

        let from = self.state;
        let t = transition(from, cmd, self.project_selected);
        if !t.accepted {
            log::debug!(target: "hostbridge::lifecycle", "{cmd:?} ignored in {from}");
            return Ok(from);
        }

        log::debug!(target: "hostbridge::lifecycle", "{cmd:?} in {from}");
        self.hooks.on_command(cmd, from);

        match cmd {
            HostCommand::WindowCreated => self.has_window = true,
            HostCommand::WindowDestroyed => self.has_window = false,
            _ => {}
        }

        if let Some(m) = t.post {
            self.shared.post_to_main(&Event::new(m, wparam, lparam));
        }

        match t.thread {
            ThreadAction::None => {}
            ThreadAction::Start => {
                self.runner.start()?;
            }
            ThreadAction::Stop => {
                self.set_state(LifecycleState::Stopping);
                self.runner.stop();
                self.shared.discard_pending();
            }
        }

        if let Some(next) = t.next {
            self.set_state(next);
        }
        Ok(self.state)
    }

    /// Error unless the engine thread may still be started.
    pub fn check_startable(&mut self) -> BridgeResult<()> {
        self.reconcile();
        if matches!(self.state, LifecycleState::Stopping | LifecycleState::Destroyed) {
            return Err(BridgeError::LifecycleMisuse(format!(
                "cannot start engine in {}",
                self.state
            )));
        }
        Ok(())
    }

    /// Start the engine thread outside the Resume path (startup path set).
    pub fn ensure_running(&mut self) -> BridgeResult<()> {
        self.check_startable()?;
        self.runner.start()?;
        if !matches!(self.state, LifecycleState::Running | LifecycleState::Paused) {
            self.set_state(LifecycleState::Running);
        }
        Ok(())
    }

    /// Blocking stop without destroying: the bridge can be resumed later.
    pub fn stop_engine(&mut self) -> bool {
        let joined = self.runner.stop();
        self.reconcile();
        joined
    }

    /// Fold an engine-side stop back into the state machine.
    fn reconcile(&mut self) {
        if matches!(self.state, LifecycleState::Running | LifecycleState::Paused)
            && !self.runner.is_running()
        {
            self.runner.reap();
            let to = if self.has_window {
                LifecycleState::WindowReady
            } else {
                LifecycleState::Created
            };
            log::info!(target: "hostbridge::lifecycle", "engine loop stopped; {} -> {}", self.state, to);
            self.set_state(to);
        }
    }

    fn set_state(&mut self, to: LifecycleState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.shared.store_state(to);
        log::info!(target: "hostbridge::lifecycle", "{from} -> {to}");
        self.hooks.on_state_changed(from, to);
    }
}
