mod common;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use common::{engine_config, take, wait_until, WAIT};
use hostbridge_core::dispatch::PassThroughApp;
use hostbridge_core::runner::EngineRunner;
use hostbridge_core::shared::BridgeShared;
use hostbridge_core::{Event, EventHandler, Message, ShutdownPolicy};

/// Blocks inside dispatch of `Custom(0)` until released.
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
    seen: Sender<Message>,
}

impl EventHandler for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        if event.message == Message::Custom(0) {
            self.entered.send(())?;
            self.release.recv()?;
        }
        self.seen.send(event.message)?;
        Ok(())
    }
}

struct Harness {
    shared: Arc<BridgeShared>,
    runner: EngineRunner,
    entered: Receiver<()>,
    release: Sender<()>,
    seen: Receiver<Message>,
}

fn harness(policy: ShutdownPolicy) -> Harness {
    let shared = Arc::new(BridgeShared::new(0));
    let runner = EngineRunner::new(
        shared.clone(),
        &engine_config(policy),
        None,
        Box::new(PassThroughApp),
    );

    let (entered_tx, entered) = bounded(1);
    let (release, release_rx) = bounded(1);
    let (seen_tx, seen) = unbounded();
    shared.registry.register(Arc::new(Gate {
        entered: entered_tx,
        release: release_rx,
        seen: seen_tx,
    }));

    Harness {
        shared,
        runner,
        entered,
        release,
        seen,
    }
}

/// Block the loop inside the first event, queue three more, then stop from
/// another thread and release the handler once the run flag is down.
fn stop_with_three_queued(policy: ShutdownPolicy) -> (Arc<BridgeShared>, Vec<Message>) {
    let Harness {
        shared,
        mut runner,
        entered,
        release,
        seen,
    } = harness(policy);

    runner.start().unwrap();
    shared.post(Message::Custom(0), 0, 0, None);
    entered.recv_timeout(WAIT).unwrap();

    for i in 1..=3 {
        shared.post(Message::Custom(i), 0, 0, None);
    }
    assert_eq!(shared.queue.len(), 3);

    let stopper = thread::spawn(move || {
        let joined = runner.stop();
        (joined, runner)
    });
    assert!(wait_until(|| !shared.is_running()));
    release.send(()).unwrap();

    let (joined, runner) = stopper.join().unwrap();
    assert!(joined);
    assert!(!runner.has_thread());
    assert!(!shared.is_running());

    drop(runner);
    let seen: Vec<Message> = seen.try_iter().collect();
    (shared, seen)
}

#[test]
fn discard_policy_drops_queued_events_on_stop() {
    common::init_logging();
    let (shared, seen) = stop_with_three_queued(ShutdownPolicy::Discard);

    assert_eq!(seen, vec![Message::Custom(0)]);
    assert!(shared.queue.is_empty());
    let stats = shared.stats.snapshot();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.discarded, 3);
    assert_eq!(shared.pool.available(), shared.pool.created());
}

#[test]
fn drain_policy_delivers_queued_events_on_stop() {
    let (shared, seen) = stop_with_three_queued(ShutdownPolicy::Drain);

    assert_eq!(
        seen,
        vec![
            Message::Custom(0),
            Message::Custom(1),
            Message::Custom(2),
            Message::Custom(3)
        ]
    );
    assert!(shared.queue.is_empty());
    let stats = shared.stats.snapshot();
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.discarded, 0);
}

#[test]
fn stop_wakes_a_loop_blocked_without_idle_tick() {
    let Harness {
        shared, mut runner, ..
    } = harness(ShutdownPolicy::Discard);

    runner.start().unwrap();
    assert!(wait_until(|| shared.stats.snapshot().wake_cycles >= 1));

    assert!(runner.stop());
    assert!(!shared.is_running());
    assert!(!runner.has_thread());
}

#[test]
fn second_start_does_not_spawn_a_second_loop() {
    let Harness {
        shared,
        mut runner,
        seen,
        ..
    } = harness(ShutdownPolicy::Discard);

    assert!(runner.start().unwrap());
    assert!(!runner.start().unwrap());
    assert!(!runner.start().unwrap());

    for i in 1..=10 {
        shared.post(Message::Custom(i), 0, 0, None);
    }
    let got = take(&seen, 10);
    assert_eq!(got, (1..=10).map(Message::Custom).collect::<Vec<_>>());
    common::assert_quiet(&seen);

    runner.stop();
}

#[test]
fn stop_is_a_no_op_when_not_running() {
    let Harness { mut runner, .. } = harness(ShutdownPolicy::Discard);
    assert!(!runner.stop());
    assert!(!runner.stop());
}

/// Requests a stop from inside dispatch.
struct StopOnNine(Arc<BridgeShared>);

impl EventHandler for StopOnNine {
    fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        if event.message == Message::Custom(9) {
            assert!(self.0.is_engine_thread());
            self.0.request_stop();
        }
        Ok(())
    }
}

#[test]
fn engine_side_stop_exits_and_is_reaped() {
    let shared = Arc::new(BridgeShared::new(0));
    let mut runner = EngineRunner::new(
        shared.clone(),
        &engine_config(ShutdownPolicy::Discard),
        None,
        Box::new(PassThroughApp),
    );
    shared.registry.register(Arc::new(StopOnNine(shared.clone())));

    runner.start().unwrap();
    shared.post(Message::Custom(9), 0, 0, None);
    assert!(wait_until(|| !shared.is_running()));

    assert!(runner.has_thread());
    assert!(runner.reap());
    assert!(!runner.has_thread());
    assert!(!shared.is_engine_thread());
}
