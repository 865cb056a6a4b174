//! Runtime configuration for monitor and drain sessions.
//!
//! These are the structs the sessions consume. They are separate from the
//! TOML-deserialized config in `acqmon_config`; see `conversions`.

use crate::error::BuildError;
use std::time::Duration;

/// Single-channel periodic sampler configuration.
#[derive(Debug, Clone)]
pub struct MonitorCfg {
    /// Number of sample slots; sampling auto-stops when they are all written.
    pub capacity: usize,
    /// Interval between trigger ticks.
    pub sample_period: Duration,
    /// Max wait for the worker to acknowledge a command (and for startup).
    pub command_timeout: Duration,
    /// Depth of the command queue. One slot is enough for a pending SAMPLE,
    /// the rest absorb control commands.
    pub queue_depth: usize,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            capacity: 1000,
            sample_period: Duration::from_millis(100),
            command_timeout: Duration::from_secs(2),
            queue_depth: 4,
        }
    }
}

impl MonitorCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.capacity == 0 {
            return Err(BuildError::InvalidConfig("capacity must be >= 1"));
        }
        if i32::try_from(self.capacity).is_err() {
            return Err(BuildError::InvalidConfig("capacity must fit in i32"));
        }
        if self.sample_period.is_zero() {
            return Err(BuildError::InvalidConfig("sample period must be > 0"));
        }
        if self.command_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("command timeout must be > 0"));
        }
        if self.queue_depth < 2 {
            return Err(BuildError::InvalidConfig("queue depth must be >= 2"));
        }
        Ok(())
    }
}

/// Ping-pong drain configuration.
#[derive(Debug, Clone)]
pub struct DrainCfg {
    /// Module channels that are polled and copied.
    pub channels: Vec<usize>,
    /// Channels on the physical module; every one is acknowledged.
    pub channels_per_module: usize,
    /// Measurements per sequence (A and B drains both count).
    pub num_measurements: usize,
    /// Sleep between "buffer full" polls.
    pub poll_interval: Duration,
    /// Give up on a full-flag poll after this long; `None` waits forever.
    pub full_timeout: Option<Duration>,
    /// Max wait for the worker to acknowledge a command (and for startup).
    pub command_timeout: Duration,
    pub queue_depth: usize,
}

impl Default for DrainCfg {
    fn default() -> Self {
        Self {
            channels: vec![0, 1, 2, 3],
            channels_per_module: 4,
            num_measurements: 100,
            poll_interval: Duration::from_millis(100),
            full_timeout: None,
            command_timeout: Duration::from_secs(2),
            queue_depth: 4,
        }
    }
}

impl DrainCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.channels.is_empty() {
            return Err(BuildError::InvalidConfig("at least one channel is required"));
        }
        if self.channels.iter().any(|&c| c >= self.channels_per_module) {
            return Err(BuildError::InvalidConfig(
                "channel index out of range for module",
            ));
        }
        let mut sorted = self.channels.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.channels.len() {
            return Err(BuildError::InvalidConfig("duplicate channel"));
        }
        if self.num_measurements == 0 {
            return Err(BuildError::InvalidConfig("num_measurements must be >= 1"));
        }
        if i32::try_from(self.num_measurements).is_err() {
            return Err(BuildError::InvalidConfig("num_measurements must fit in i32"));
        }
        if self.command_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("command timeout must be > 0"));
        }
        if self.queue_depth < 2 {
            return Err(BuildError::InvalidConfig("queue depth must be >= 2"));
        }
        Ok(())
    }
}
