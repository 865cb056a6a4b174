//! Test and helper devices for acqmon_core

use acqmon_traits::{HwResult, ValueSource};

/// A source that always errors on read; opens a session without touching
/// hardware and exercises the ERROR path on the first tick.
pub struct NoopSource;

impl ValueSource for NoopSource {
    fn read_value(&mut self) -> HwResult<f64> {
        Err(Box::new(std::io::Error::other("noop source")))
    }
}

/// A source that returns the same value on every read.
pub struct ConstSource(pub f64);

impl ValueSource for ConstSource {
    fn read_value(&mut self) -> HwResult<f64> {
        Ok(self.0)
    }
}
