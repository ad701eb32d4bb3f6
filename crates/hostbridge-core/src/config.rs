use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

/// What the engine thread does with undelivered envelopes once it observes a
/// stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Stop dispatching immediately; leftovers go back to the pool.
    #[default]
    Discard,
    /// Dispatch whatever is queued in one final pass, then exit.
    Drain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    #[serde(default = "default_stack_size_kb")]
    pub stack_size_kb: u32,

    /// 0 disables the idle tick: the loop sleeps until woken.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    #[serde(default = "default_pool_prewarm")]
    pub pool_prewarm: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Register a handler that logs every dispatched event.
    #[serde(default)]
    pub trace_events: bool,
}

fn default_thread_name() -> String {
    "hostbridge-main".to_string()
}
fn default_stack_size_kb() -> u32 {
    256
}
fn default_idle_interval_ms() -> u64 {
    16
}
fn default_pool_prewarm() -> usize {
    8
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size_kb: default_stack_size_kb(),
            idle_interval_ms: default_idle_interval_ms(),
            shutdown_policy: ShutdownPolicy::default(),
            pool_prewarm: default_pool_prewarm(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            trace_events: false,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn idle_interval(&self) -> Option<Duration> {
        match self.idle_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    #[inline]
    pub fn stack_size_bytes(&self) -> usize {
        (self.stack_size_kb as usize).max(64) * 1024
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> BridgeResult<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Missing file yields defaults; a file that exists but does not parse is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s)
                .map_err(|e| BridgeError::Config(format!("parse {}: {}", path.display(), e))),
            Err(_) => Ok(Self::default()),
        }
    }
}
