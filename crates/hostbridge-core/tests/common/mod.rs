#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_core::{BridgeConfig, EngineConfig, Event, EventHandler, ShutdownPolicy};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Engine config with no idle tick, so the loop only wakes for work or stop.
pub fn engine_config(policy: ShutdownPolicy) -> EngineConfig {
    EngineConfig {
        idle_interval_ms: 0,
        shutdown_policy: policy,
        ..EngineConfig::default()
    }
}

pub fn bridge_config(policy: ShutdownPolicy) -> BridgeConfig {
    BridgeConfig {
        engine: engine_config(policy),
        ..BridgeConfig::default()
    }
}

/// Forwards every event it sees, tagged with its name, to a shared channel.
pub struct Recorder {
    name: &'static str,
    tx: Sender<(&'static str, Event)>,
}

impl Recorder {
    pub fn new(name: &'static str, tx: Sender<(&'static str, Event)>) -> Arc<Self> {
        Arc::new(Self { name, tx })
    }
}

impl EventHandler for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        self.tx.send((self.name, *event))?;
        Ok(())
    }
}

pub fn channel() -> (Sender<(&'static str, Event)>, Receiver<(&'static str, Event)>) {
    unbounded()
}

/// Receive exactly `n` records or panic on timeout.
pub fn take<T>(rx: &Receiver<T>, n: usize) -> Vec<T> {
    (0..n)
        .map(|i| {
            rx.recv_timeout(WAIT)
                .unwrap_or_else(|_| panic!("timed out waiting for record {i} of {n}"))
        })
        .collect()
}

/// Assert nothing more arrives within a short grace period.
pub fn assert_quiet<T: std::fmt::Debug>(rx: &Receiver<T>) {
    if let Ok(extra) = rx.recv_timeout(Duration::from_millis(50)) {
        panic!("unexpected record {extra:?}");
    }
}

/// Bounded polling for conditions that have no event to wait on.
pub fn wait_until<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
