//! `From` implementations bridging `acqmon_config` types to the runtime configs.

use crate::config::{DrainCfg, MonitorCfg};
use std::time::Duration;

impl From<&acqmon_config::MonitorCfg> for MonitorCfg {
    fn from(c: &acqmon_config::MonitorCfg) -> Self {
        Self {
            capacity: c.capacity,
            sample_period: Duration::from_millis(c.sample_period_ms),
            command_timeout: Duration::from_millis(c.command_timeout_ms),
            queue_depth: c.queue_depth,
        }
    }
}

impl From<&acqmon_config::DrainCfg> for DrainCfg {
    fn from(c: &acqmon_config::DrainCfg) -> Self {
        Self {
            channels: c.channels.clone(),
            channels_per_module: c.channels_per_module,
            num_measurements: c.num_measurements,
            poll_interval: Duration::from_millis(c.poll_ms),
            // 0 means wait forever
            full_timeout: (c.full_timeout_ms > 0)
                .then(|| Duration::from_millis(c.full_timeout_ms)),
            command_timeout: Duration::from_millis(c.command_timeout_ms),
            queue_depth: c.queue_depth,
        }
    }
}
