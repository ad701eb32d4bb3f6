use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use hostbridge_core::{Event, EventHandler, LogConfig, Message};
use log::{Level, LevelFilter};

/// Install `env_logger` with the configured default level.
///
/// `RUST_LOG` takes precedence when set. Returns false if a logger was
/// already installed; that is not an error.
pub fn init(cfg: &LogConfig) -> bool {
    let level = parse_level(&cfg.level);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.try_init().is_ok()
}

/// Unknown names fall back to `info`.
pub fn parse_level(name: &str) -> LevelFilter {
    LevelFilter::from_str(name.trim()).unwrap_or(LevelFilter::Info)
}

/// Logs every event it is handed. Register it like any other handler.
pub struct EventTraceHandler {
    level: Level,
    seen: AtomicU64,
}

impl EventTraceHandler {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            seen: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl Default for EventTraceHandler {
    fn default() -> Self {
        Self::new(Level::Debug)
    }
}

impl EventHandler for EventTraceHandler {
    fn name(&self) -> &str {
        "event-trace"
    }

    fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        match event.touch() {
            Some(t) => log::log!(
                target: "hostbridge::trace",
                self.level,
                "#{n} {:?} ({:.1}, {:.1}) id={} tick={}",
                t.phase,
                t.x,
                t.y,
                t.pointer_id,
                t.tick
            ),
            None => log::log!(
                target: "hostbridge::trace",
                self.level,
                "#{n} {} w={:#x} l={:#x}",
                describe(event.message),
                event.wparam,
                event.lparam
            ),
        }
        Ok(())
    }
}

fn describe(m: Message) -> String {
    match m {
        Message::Custom(code) => format!("Custom({code:#x})"),
        known => format!("{known:?}"),
    }
}
