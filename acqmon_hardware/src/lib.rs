//! Concrete endpoints for the acquisition monitor.
//!
//! Only simulated devices live here for now; they behave like the real ones
//! closely enough (blocking reads, injected faults, ping-pong backpressure) to
//! exercise every path of the core.
pub mod error;
pub mod module;

pub use module::{ModuleProbe, SimulatedModule};

use acqmon_traits::{HwResult, ValueSource};
use error::HwError;
use std::time::Duration;

/// How an injected failure presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A generic device error.
    Device,
    /// A read that timed out.
    Timeout,
}

/// Scripted value source: returns `values` in order (cycling when exhausted)
/// and optionally fails on one read.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    values: Vec<f64>,
    reads: usize,
    fail_at: Option<usize>,
    fault: FaultKind,
    delay: Duration,
}

impl SimulatedSource {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            reads: 0,
            fail_at: None,
            fault: FaultKind::Device,
            delay: Duration::ZERO,
        }
    }

    /// Fail the `n`-th read (1-based). Reads after it succeed again.
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Select how the injected failure is reported.
    pub fn fault_kind(mut self, kind: FaultKind) -> Self {
        self.fault = kind;
        self
    }

    /// Block every read for `d`, like a slow serial round-trip.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// Number of reads attempted so far, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl ValueSource for SimulatedSource {
    fn read_value(&mut self) -> HwResult<f64> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.reads += 1;
        if self.fail_at == Some(self.reads) {
            tracing::warn!(read = self.reads, "injected read failure");
            return Err(Box::new(match self.fault {
                FaultKind::Device => HwError::Device("injected failure".into()),
                FaultKind::Timeout => HwError::Timeout,
            }));
        }
        if self.values.is_empty() {
            return Ok(0.0);
        }
        let v = self.values[(self.reads - 1) % self.values.len()];
        tracing::trace!(value = v, "simulated read");
        Ok(v)
    }
}

/// Linear ramp: `start + step * n` for the n-th read (0-based).
#[derive(Debug, Clone, Copy)]
pub struct RampSource {
    start: f64,
    step: f64,
    n: u64,
}

impl RampSource {
    pub fn new(start: f64, step: f64) -> Self {
        Self { start, step, n: 0 }
    }
}

impl ValueSource for RampSource {
    fn read_value(&mut self) -> HwResult<f64> {
        let v = self.start + self.step * self.n as f64;
        self.n += 1;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn simulated_source_cycles_values() {
        let mut src = SimulatedSource::new(vec![1.0, 2.0]);
        let got: Vec<f64> = (0..5).map(|_| src.read_value().unwrap()).collect();
        assert_eq!(got, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
        assert_eq!(src.reads(), 5);
    }

    #[rstest]
    #[case(FaultKind::Device, "device error")]
    #[case(FaultKind::Timeout, "timeout")]
    fn simulated_source_fails_once(#[case] kind: FaultKind, #[case] needle: &str) {
        let mut src = SimulatedSource::new(vec![1.0, 2.0, 3.0])
            .fail_at(2)
            .fault_kind(kind);
        assert_eq!(src.read_value().unwrap(), 1.0);
        let err = src.read_value().expect_err("second read should fail");
        assert!(err.to_string().contains(needle), "got: {err}");
        assert_eq!(src.read_value().unwrap(), 3.0);
    }

    #[test]
    fn empty_source_reads_zero() {
        let mut src = SimulatedSource::new(Vec::new());
        assert_eq!(src.read_value().unwrap(), 0.0);
    }

    #[test]
    fn ramp_source_steps() {
        let mut ramp = RampSource::new(10.0, 0.5);
        assert_eq!(ramp.read_value().unwrap(), 10.0);
        assert_eq!(ramp.read_value().unwrap(), 10.5);
        assert_eq!(ramp.read_value().unwrap(), 11.0);
    }
}
