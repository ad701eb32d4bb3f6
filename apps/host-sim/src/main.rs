mod vm;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_core::host::{HostServices, RuntimeBridge};
use hostbridge_core::{
    AppDelegate, Bridge, BridgeConfig, Event, EventHandler, HostCommand, LifecycleHooks,
    LifecycleState, Message, MESSAGE_BASE,
};
use hostbridge_modules_logging::EventTraceHandler;

use crate::vm::{SimVm, VmRequest};

/// Application message: the input script is done, ask the host to finish.
const QUIT: i32 = MESSAGE_BASE + 0x100;

const PACKAGE: &str = "org.hostbridge.demo";

#[derive(Default)]
struct SimApp {
    idle_ticks: u64,
}

impl AppDelegate for SimApp {
    fn id(&self) -> &'static str {
        "host-sim"
    }

    fn on_loop_start(&mut self) {
        self.idle_ticks = 0;
    }

    fn app_dispatch(&mut self, event: &Event) -> bool {
        if event.message == Message::StartupScript {
            log::info!(target: "host_sim", "running startup script");
            return true;
        }
        false
    }

    fn idle(&mut self) {
        self.idle_ticks += 1;
    }

    fn on_loop_exit(&mut self) {
        log::info!(target: "host_sim", "loop exited after {} idle ticks", self.idle_ticks);
    }
}

struct LogHooks;

impl LifecycleHooks for LogHooks {
    fn on_state_changed(&mut self, from: LifecycleState, to: LifecycleState) {
        log::info!(target: "host_sim", "state {from} -> {to}");
    }
}

/// The main window: reacts to surface and touch events by calling back
/// into the host.
struct GameWindow {
    host: HostServices,
    strokes: AtomicU64,
}

impl GameWindow {
    fn new(bridge: RuntimeBridge) -> Self {
        Self {
            host: HostServices::new(bridge),
            strokes: AtomicU64::new(0),
        }
    }
}

impl EventHandler for GameWindow {
    fn name(&self) -> &str {
        "game-window"
    }

    fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        match event.message {
            Message::SurfaceCreated => {
                let caption = format!("{} ({})", self.host.package_name()?, self.host.system_version()?);
                self.host.set_caption(&caption)?;
            }
            Message::SurfaceChanged => self.host.change_surface_size(1280, 720)?,
            Message::TouchUp => {
                let n = self.strokes.fetch_add(1, Ordering::Relaxed) + 1;
                self.host.show_toast(&format!("stroke {n}"))?;
            }
            Message::Custom(QUIT) => {
                log::info!(
                    target: "host_sim",
                    "quit after {} strokes; data in {}",
                    self.strokes.load(Ordering::Relaxed),
                    self.host.internal_data_path()?
                );
                self.host.request_finish()?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn feed_touches(bridge: &Bridge, strokes: usize) {
    let started = Instant::now();
    let tick = || started.elapsed().as_millis() as i64;

    for s in 0..strokes {
        let id = s as i32;
        let x0 = 100.0 + 40.0 * s as f32;
        bridge.send_touch(0, x0, 200.0, 1.0, id, tick());
        for step in 1..=5 {
            thread::sleep(Duration::from_millis(4));
            bridge.send_touch(1, x0 + 8.0 * step as f32, 200.0 + 3.0 * step as f32, 1.0, id, tick());
        }
        bridge.send_touch(2, x0 + 48.0, 218.0, 0.0, id, tick());
    }

    if let Err(e) = bridge.send_message(QUIT, 0, 0) {
        log::error!(target: "host_sim", "quit message: {e}");
    }
}

/// Serve host requests until the engine asks to finish or the user interrupts.
fn pump_ui(requests: &Receiver<VmRequest>, interrupted: &AtomicBool) -> bool {
    loop {
        if interrupted.load(Ordering::Relaxed) {
            log::warn!(target: "host_sim", "interrupted");
            return false;
        }
        match requests.recv_timeout(Duration::from_millis(100)) {
            Ok(VmRequest::Finish) => return true,
            Ok(req) => log::info!(target: "host_sim", "ui: {req:?}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "hostbridge.toml".to_string());
    let project = args.next().unwrap_or_else(|| "/sdcard/projects/demo".to_string());
    let strokes: usize = match args.next() {
        Some(s) => s.parse()?,
        None => 3,
    };

    let cfg = BridgeConfig::load_or_default(&config_path)?;
    hostbridge_modules_logging::init(&cfg.log);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;
    }

    let (ui_tx, ui_rx) = unbounded();
    let vm = Arc::new(SimVm::new(PACKAGE, &format!("/data/data/{PACKAGE}"), ui_tx));

    let bridge = Arc::new(
        Bridge::builder(cfg.clone())
            .app(SimApp::default())
            .hooks(LogHooks)
            .host_runtime(vm.clone())
            .build(),
    );

    let window = bridge.register_handler(Arc::new(GameWindow::new(RuntimeBridge::new(vm))));
    bridge.set_main_window(window)?;
    if cfg.log.trace_events {
        bridge.register_handler(Arc::new(EventTraceHandler::default()));
    }

    bridge.on_command(HostCommand::WindowCreated)?;
    bridge.on_command(HostCommand::Resume)?;
    bridge.set_startup_path(&project)?;
    bridge.send_message(Message::SurfaceChanged.code(), 0, 0)?;
    bridge.on_command(HostCommand::GainedFocus)?;

    let input = {
        let bridge = bridge.clone();
        thread::Builder::new()
            .name("input".to_string())
            .spawn(move || feed_touches(&bridge, strokes))?
    };

    let finished = pump_ui(&ui_rx, &interrupted);
    if input.join().is_err() {
        log::error!(target: "host_sim", "input thread panicked");
    }

    bridge.on_command(HostCommand::Pause)?;
    bridge.shutdown()?;
    log::info!(target: "host_sim", "finished={finished} state={}", bridge.state());

    println!("{}", serde_json::to_string_pretty(&bridge.stats())?);
    Ok(())
}
