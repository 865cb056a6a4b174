//! Hardware-facing traits shared by the acquisition monitor stack.
//!
//! Everything that touches a real instrument goes through these traits, so the
//! core can run against simulated endpoints in tests and on the bench.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type crossing the trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A single-channel endpoint sampled by a monitor session (motor position,
/// scaler value, analog input, ...).
pub trait ValueSource {
    /// Perform one blocking read of the current value.
    fn read_value(&mut self) -> HwResult<f64>;
}

impl<T: ValueSource + ?Sized> ValueSource for Box<T> {
    fn read_value(&mut self) -> HwResult<f64> {
        (**self).read_value()
    }
}

/// One of the two alternating hardware buffers of a ping-pong module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    A,
    B,
}

impl Bank {
    /// The bank that follows this one in the ping-pong cycle.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Bank::A => Bank::B,
            Bank::B => Bank::A,
        }
    }

    /// Lowercase letter used in run-data names (`buffer_a`, `buffer_full_b`).
    #[inline]
    pub fn letter(self) -> char {
        match self {
            Bank::A => 'a',
            Bank::B => 'b',
        }
    }
}

impl std::fmt::Display for Bank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer_{}", self.letter())
    }
}

/// An acquisition module that fills two alternating buffers per channel.
///
/// Hardware must stall instead of overwriting a bank that has not been
/// acknowledged with [`BufferedModule::buffer_done`].
pub trait BufferedModule {
    /// Channels on the module; every one of them is acknowledged per bank.
    fn channels(&self) -> usize;

    /// Number of scaler values delivered per channel per measurement.
    fn scalers_per_channel(&self) -> usize;

    /// Arm the module: clear both banks and begin filling from measurement 0.
    fn start_run(&mut self) -> HwResult<()>;

    /// Whether `bank` of `channel` has been filled and is waiting to be drained.
    fn buffer_full(&mut self, channel: usize, bank: Bank) -> HwResult<bool>;

    /// Copy `bank` of `channel` into `out` (`out.len() == scalers_per_channel()`).
    fn read_buffer(&mut self, channel: usize, bank: Bank, out: &mut [u32]) -> HwResult<()>;

    /// Tell the hardware `bank` of `channel` was consumed and may be refilled.
    fn buffer_done(&mut self, channel: usize, bank: Bank) -> HwResult<()>;

    /// Stop the run on every channel of the module.
    fn stop_run(&mut self) -> HwResult<()>;
}

impl<T: BufferedModule + ?Sized> BufferedModule for Box<T> {
    fn channels(&self) -> usize {
        (**self).channels()
    }
    fn scalers_per_channel(&self) -> usize {
        (**self).scalers_per_channel()
    }
    fn start_run(&mut self) -> HwResult<()> {
        (**self).start_run()
    }
    fn buffer_full(&mut self, channel: usize, bank: Bank) -> HwResult<bool> {
        (**self).buffer_full(channel, bank)
    }
    fn read_buffer(&mut self, channel: usize, bank: Bank, out: &mut [u32]) -> HwResult<()> {
        (**self).read_buffer(channel, bank, out)
    }
    fn buffer_done(&mut self, channel: usize, bank: Bank) -> HwResult<()> {
        (**self).buffer_done(channel, bank)
    }
    fn stop_run(&mut self) -> HwResult<()> {
        (**self).stop_run()
    }
}

#[cfg(test)]
mod tests {
    use super::Bank;

    #[test]
    fn banks_alternate() {
        assert_eq!(Bank::A.other(), Bank::B);
        assert_eq!(Bank::B.other(), Bank::A);
        assert_eq!(Bank::A.to_string(), "buffer_a");
        assert_eq!(Bank::B.letter(), 'b');
    }
}
