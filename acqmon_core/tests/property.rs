mod common;

use acqmon_core::{DrainCfg, DrainSession, ManualTicker, MonitorSession, MonitorStatus};
use acqmon_hardware::module::expected_value;
use acqmon_hardware::{SimulatedModule, SimulatedSource};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn read_all_returns_the_fed_sequence(
        capacity in 1usize..12,
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..12),
    ) {
        let n = values.len().min(capacity);
        let ticker = ManualTicker::new();
        let s = MonitorSession::builder()
            .with_device(SimulatedSource::new(values.clone()))
            .with_capacity(capacity)
            .with_trigger(ticker.factory())
            .build()
            .unwrap();
        s.start().unwrap();
        for _ in 0..n {
            common::step(&s, &ticker);
        }

        prop_assert_eq!(s.read_all(), values[..n].to_vec());
        prop_assert_eq!(s.last_index(), i32::try_from(n).unwrap() - 1);
        prop_assert_eq!(s.total_count(), u32::try_from(n).unwrap());
        let expected = if n == capacity {
            MonitorStatus::Idle
        } else {
            MonitorStatus::Acquiring
        };
        prop_assert_eq!(s.status(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn drain_reads_every_slot_exactly_once(
        measurements in 1usize..9,
        fill_us in 0u64..1500,
        poll_us in 100u64..1500,
        mask in 1u8..16,
    ) {
        let channels: Vec<usize> = (0..4).filter(|c| mask & (1 << c) != 0).collect();
        let module = SimulatedModule::new(4, 3).fill_interval(Duration::from_micros(fill_us));
        let probe = module.probe();
        let cfg = DrainCfg {
            channels: channels.clone(),
            num_measurements: measurements,
            poll_interval: Duration::from_micros(poll_us),
            ..DrainCfg::default()
        };
        let s = DrainSession::open(module, cfg).unwrap();
        s.arm().unwrap();
        prop_assert_eq!(s.wait_until_done(Duration::from_secs(5)), MonitorStatus::Idle);

        let mut reads = probe.reads();
        reads.sort_unstable();
        let mut expected: Vec<(u64, usize)> = (0..measurements as u64)
            .flat_map(|m| channels.iter().map(move |&c| (m, c)))
            .collect();
        expected.sort_unstable();
        prop_assert_eq!(reads, expected);

        for &ch in &channels {
            for m in 0..measurements {
                let want: Vec<u32> = (0..3).map(|sc| expected_value(m as u64, ch, sc)).collect();
                prop_assert_eq!(s.measurement(ch, m).unwrap(), want);
            }
        }
        prop_assert_eq!(s.total_pixels(), u32::try_from(measurements).unwrap());
        prop_assert_eq!(probe.stop_count(), 1);
    }
}
