pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod host;
pub mod lifecycle;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod shared;
pub mod sync;
pub mod telemetry;

pub use crate::bridge::{Bridge, BridgeBuilder};
pub use crate::config::{BridgeConfig, EngineConfig, LogConfig, ShutdownPolicy};
pub use crate::dispatch::{AppDelegate, DispatchEngine, PassThroughApp, StartupScriptApp};
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::event::{Event, EventEnvelope, Message, Touch, MESSAGE_BASE};
pub use crate::lifecycle::{HostCommand, LifecycleHooks, LifecycleState};
pub use crate::registry::{EventHandler, HandlerId, HandlerRegistry};
pub use crate::telemetry::StatsSnapshot;
