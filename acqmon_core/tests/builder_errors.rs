use acqmon_core::error::{BuildError, MonitorError};
use acqmon_core::mocks::ConstSource;
use acqmon_core::{DrainSession, MonitorSession, MonitorStatus};
use acqmon_hardware::SimulatedModule;
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn monitor_builder_without_device_is_a_config_error() {
    let err = MonitorSession::builder()
        .with_capacity(4)
        .try_build()
        .expect_err("should fail without a device");
    assert_eq!(
        err,
        MonitorError::Config(BuildError::MissingDevice.to_string())
    );
}

#[rstest]
fn drain_builder_without_module_is_a_config_error() {
    let err = DrainSession::builder()
        .try_build()
        .expect_err("should fail without a module");
    assert_eq!(
        err,
        MonitorError::Config(BuildError::MissingModule.to_string())
    );
}

#[rstest]
#[case::zero_capacity(0, 10, "capacity must be >= 1")]
#[case::zero_period(4, 0, "sample period must be > 0")]
fn invalid_monitor_config_is_rejected(
    #[case] capacity: usize,
    #[case] period_ms: u64,
    #[case] needle: &str,
) {
    let err = MonitorSession::builder()
        .with_device(ConstSource(0.0))
        .with_capacity(capacity)
        .with_sample_period(Duration::from_millis(period_ms))
        .build()
        .expect_err("invalid config");
    assert!(err.to_string().contains(needle), "got: {err}");
}

#[rstest]
#[case::no_channels(vec![], 4)]
#[case::duplicate(vec![1, 1], 4)]
#[case::out_of_range(vec![0, 7], 4)]
#[case::zero_measurements(vec![0], 0)]
fn invalid_drain_config_is_rejected(#[case] channels: Vec<usize>, #[case] measurements: usize) {
    let err = DrainSession::builder()
        .with_module(SimulatedModule::new(4, 1))
        .with_channels(channels)
        .with_measurements(measurements)
        .build()
        .expect_err("invalid config");
    assert!(matches!(err, MonitorError::Config(_)), "got {err:?}");
}

#[test]
fn builder_opens_idle_session() {
    let s = MonitorSession::builder()
        .with_device(ConstSource(2.5))
        .with_capacity(3)
        .build()
        .unwrap();
    assert_eq!(s.status(), MonitorStatus::Idle);
    assert_eq!(s.capacity(), 3);
}
