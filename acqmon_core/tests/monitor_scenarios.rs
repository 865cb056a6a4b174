//! End-to-end monitor sessions on the wall-clock periodic trigger.

mod common;

use acqmon_core::{ManualTicker, MonitorCfg, MonitorSession, MonitorStatus};
use acqmon_hardware::{FaultKind, SimulatedSource};
use rstest::rstest;
use std::time::Duration;

fn cfg(capacity: usize, period_ms: u64) -> MonitorCfg {
    MonitorCfg {
        capacity,
        sample_period: Duration::from_millis(period_ms),
        ..MonitorCfg::default()
    }
}

#[test]
fn fills_to_capacity_then_auto_stops() {
    let src = SimulatedSource::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let s = MonitorSession::open(src, cfg(5, 10)).unwrap();
    assert_eq!(s.start().unwrap(), MonitorStatus::Acquiring);

    std::thread::sleep(Duration::from_millis(60));
    // Generous bound for loaded CI machines.
    let status = s.wait_while_acquiring(Duration::from_secs(2));

    assert_eq!(status, MonitorStatus::Idle);
    assert_eq!(s.read_all(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(s.last_index(), 4);
    assert_eq!(s.total_count(), 5);
}

#[test]
fn stop_before_first_tick_changes_nothing() {
    let s = MonitorSession::open(SimulatedSource::new(vec![9.0]), cfg(4, 1_000)).unwrap();
    let before = s.snapshot();

    s.start().unwrap();
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);

    assert_eq!(s.status(), MonitorStatus::Idle);
    assert_eq!(s.last_index(), -1);
    assert_eq!(s.snapshot(), before);
    assert_eq!(s.total_count(), 0);
}

#[rstest]
#[case(FaultKind::Device, "hardware error")]
#[case(FaultKind::Timeout, "timeout")]
fn read_failure_on_third_tick_enters_error(#[case] kind: FaultKind, #[case] needle: &str) {
    let src = SimulatedSource::new(vec![1.0, 2.0, 3.0, 4.0, 5.0])
        .fail_at(3)
        .fault_kind(kind);
    let s = MonitorSession::open(src, cfg(5, 10)).unwrap();
    s.start().unwrap();

    let status = s.wait_while_acquiring(Duration::from_secs(2));
    assert_eq!(status, MonitorStatus::Error);
    assert_eq!(s.last_index(), 1);
    assert_eq!(s.read_all(), vec![1.0, 2.0]);
    let msg = s.last_error().unwrap();
    assert!(msg.contains(needle), "got: {msg}");

    // Worker is still alive and answers CLEAR within one round-trip.
    assert_eq!(s.clear().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.last_index(), -1);
    assert_eq!(s.snapshot(), vec![0.0; 5]);
    assert_eq!(s.last_error(), None);
}

#[test]
fn stop_is_idempotent() {
    let s = MonitorSession::open(SimulatedSource::new(vec![1.0]), cfg(3, 1_000)).unwrap();
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.last_index(), -1);
}

#[test]
fn start_while_acquiring_is_a_no_op() {
    let s = MonitorSession::open(SimulatedSource::new(vec![1.0]), cfg(3, 1_000)).unwrap();
    assert_eq!(s.start().unwrap(), MonitorStatus::Acquiring);
    assert_eq!(s.start().unwrap(), MonitorStatus::Acquiring);
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
}

#[test]
fn start_while_in_error_needs_recovery() {
    let src = SimulatedSource::new(vec![1.0]).fail_at(1);
    let s = MonitorSession::open(src, cfg(3, 5)).unwrap();
    s.start().unwrap();
    assert_eq!(
        s.wait_while_acquiring(Duration::from_secs(2)),
        MonitorStatus::Error
    );
    assert_eq!(s.start().unwrap(), MonitorStatus::Error);
    assert_eq!(s.stop().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.start().unwrap(), MonitorStatus::Acquiring);
    assert_eq!(
        s.wait_while_acquiring(Duration::from_secs(2)),
        MonitorStatus::Idle
    );
    assert_eq!(s.read_all(), vec![1.0, 1.0, 1.0]);
}

#[rstest]
#[case::from_idle(false)]
#[case::from_acquiring(true)]
fn clear_zeroes_buffer_from_any_status(#[case] restart: bool) {
    let ticker = ManualTicker::new();
    let s = MonitorSession::builder()
        .with_device(SimulatedSource::new(vec![7.0]))
        .with_capacity(2)
        .with_trigger(ticker.factory())
        .build()
        .unwrap();
    s.start().unwrap();
    common::step(&s, &ticker);
    common::step(&s, &ticker);
    assert_eq!(s.status(), MonitorStatus::Idle);
    assert_eq!(s.read_all(), vec![7.0, 7.0]);
    if restart {
        // START keeps old slot contents; only last_index is reset.
        assert_eq!(s.start().unwrap(), MonitorStatus::Acquiring);
        assert_eq!(s.snapshot(), vec![7.0, 7.0]);
    }

    assert_eq!(s.clear().unwrap(), MonitorStatus::Idle);
    assert_eq!(s.snapshot(), vec![0.0, 0.0]);
    assert_eq!(s.last_index(), -1);
    assert!(!ticker.is_armed());
}

#[test]
fn total_count_survives_clear_and_restart() {
    let s = MonitorSession::open(SimulatedSource::new(vec![1.0, 2.0]), cfg(2, 5)).unwrap();
    for _ in 0..3 {
        s.start().unwrap();
        assert_eq!(
            s.wait_while_acquiring(Duration::from_secs(2)),
            MonitorStatus::Idle
        );
        s.clear().unwrap();
    }
    assert_eq!(s.total_count(), 6);
    assert_eq!(s.last_index(), -1);
}

#[test]
fn slow_device_coalesces_ticks() {
    // Reads take longer than the period; pending ticks must not pile up.
    let src = SimulatedSource::new(vec![1.0]).with_delay(Duration::from_millis(20));
    let s = MonitorSession::open(src, cfg(3, 2)).unwrap();
    s.start().unwrap();
    assert_eq!(
        s.wait_while_acquiring(Duration::from_secs(2)),
        MonitorStatus::Idle
    );
    assert_eq!(s.last_index(), 2);
    assert!(s.missed_ticks() > 0);
}
