//! Session worker lifecycle: startup handshake, EXIT + join, no leaked threads.

use acqmon_core::mocks::{ConstSource, NoopSource};
use acqmon_core::{
    DrainCfg, DrainSession, MonitorCfg, MonitorError, MonitorSession, MonitorStatus, TickFn,
    Trigger, TriggerFactory,
};
use acqmon_hardware::SimulatedModule;
use std::time::{Duration, Instant};

fn cfg(capacity: usize) -> MonitorCfg {
    MonitorCfg {
        capacity,
        sample_period: Duration::from_millis(5),
        ..MonitorCfg::default()
    }
}

#[test]
fn open_returns_only_after_worker_is_idle() {
    let s = MonitorSession::open(ConstSource(1.0), cfg(4)).unwrap();
    assert_eq!(s.status(), MonitorStatus::Idle);
}

#[test]
fn drop_while_acquiring_joins_promptly() {
    let s = MonitorSession::open(ConstSource(1.0), cfg(1_000_000)).unwrap();
    s.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let t0 = Instant::now();
    drop(s);
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn many_sessions_open_and_close_cleanly() {
    for _ in 0..10 {
        let s = MonitorSession::open(ConstSource(1.0), cfg(8)).unwrap();
        s.start().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        s.close().unwrap();

        let d = DrainSession::open(SimulatedModule::new(4, 1), DrainCfg::default()).unwrap();
        d.close().unwrap();
    }
}

#[test]
fn failed_session_keeps_its_worker() {
    let s = MonitorSession::open(NoopSource, cfg(4)).unwrap();
    s.start().unwrap();
    assert_eq!(
        s.wait_while_acquiring(Duration::from_secs(2)),
        MonitorStatus::Error
    );
    // Worker still answers commands.
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.clear().unwrap(), MonitorStatus::Idle);
    s.close().unwrap();
}

struct BrokenTrigger;

impl TriggerFactory for BrokenTrigger {
    fn create(self: Box<Self>, _tick: TickFn) -> Result<Box<dyn Trigger>, MonitorError> {
        Err(MonitorError::Setup("no timer available".into()))
    }
}

#[test]
fn trigger_setup_failure_is_reported_by_open() {
    let err = MonitorSession::builder()
        .with_device(ConstSource(1.0))
        .with_trigger(Box::new(BrokenTrigger))
        .build()
        .unwrap_err();
    match err {
        MonitorError::Setup(msg) => assert!(msg.contains("no timer available"), "got {msg}"),
        other => panic!("expected Setup, got {other:?}"),
    }
}

#[test]
fn concurrent_controllers_never_lose_commands() {
    let s = std::sync::Arc::new(MonitorSession::open(ConstSource(1.0), cfg(1_000_000)).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let s = s.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let res = if i % 2 == 0 { s.start() } else { s.stop() };
                    assert!(res.is_ok(), "command failed: {res:?}");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
}
