//! Type-state builders for `MonitorSession` and `DrainSession`.
//!
//! `build()` only exists once the device (or module) is set; `try_build()` is
//! always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use acqmon_traits::clock::{Clock, MonotonicClock};
use acqmon_traits::{BufferedModule, ValueSource};

use crate::config::{DrainCfg, MonitorCfg};
use crate::drain::DrainSession;
use crate::error::{BuildError, Result};
use crate::monitor::MonitorSession;
use crate::trigger::{Periodic, TriggerFactory};

pub struct Missing;
pub struct Set;

type BoxedClock = Box<dyn Clock + Send + Sync>;

fn shared_clock(clock: Option<BoxedClock>) -> Arc<dyn Clock + Send + Sync> {
    match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    }
}

// ── Monitor ──────────────────────────────────────────────────────────────────

pub struct MonitorSessionBuilder<D = Missing> {
    device: Option<Box<dyn ValueSource + Send>>,
    cfg: MonitorCfg,
    trigger: Option<Box<dyn TriggerFactory>>,
    clock: Option<BoxedClock>,
    _d: PhantomData<D>,
}

impl Default for MonitorSessionBuilder<Missing> {
    fn default() -> Self {
        Self {
            device: None,
            cfg: MonitorCfg::default(),
            trigger: None,
            clock: None,
            _d: PhantomData,
        }
    }
}

impl MonitorSessionBuilder<Missing> {
    pub fn with_device(
        self,
        device: impl ValueSource + Send + 'static,
    ) -> MonitorSessionBuilder<Set> {
        MonitorSessionBuilder {
            device: Some(Box::new(device)),
            cfg: self.cfg,
            trigger: self.trigger,
            clock: self.clock,
            _d: PhantomData,
        }
    }
}

impl<D> MonitorSessionBuilder<D> {
    pub fn with_config(mut self, cfg: MonitorCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.cfg.capacity = capacity;
        self
    }
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.cfg.sample_period = period;
        self
    }
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.command_timeout = timeout;
        self
    }
    /// Replace the wall-clock periodic trigger (e.g. with a `ManualTicker`).
    pub fn with_trigger(mut self, trigger: Box<dyn TriggerFactory>) -> Self {
        self.trigger = Some(trigger);
        self
    }
    /// Clock used for the stall watchdog; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn try_build(self) -> Result<MonitorSession> {
        let device = self.device.ok_or(BuildError::MissingDevice)?;
        MonitorSession::spawn(
            device,
            self.cfg,
            self.trigger.unwrap_or_else(|| Box::new(Periodic)),
            shared_clock(self.clock),
        )
    }
}

impl MonitorSessionBuilder<Set> {
    pub fn build(self) -> Result<MonitorSession> {
        self.try_build()
    }
}

// ── Drain ────────────────────────────────────────────────────────────────────

pub struct DrainSessionBuilder<M = Missing> {
    module: Option<Box<dyn BufferedModule + Send>>,
    cfg: DrainCfg,
    clock: Option<BoxedClock>,
    _m: PhantomData<M>,
}

impl Default for DrainSessionBuilder<Missing> {
    fn default() -> Self {
        Self {
            module: None,
            cfg: DrainCfg::default(),
            clock: None,
            _m: PhantomData,
        }
    }
}

impl DrainSessionBuilder<Missing> {
    pub fn with_module(
        self,
        module: impl BufferedModule + Send + 'static,
    ) -> DrainSessionBuilder<Set> {
        DrainSessionBuilder {
            module: Some(Box::new(module)),
            cfg: self.cfg,
            clock: self.clock,
            _m: PhantomData,
        }
    }
}

impl<M> DrainSessionBuilder<M> {
    pub fn with_config(mut self, cfg: DrainCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.cfg.channels = channels;
        self
    }
    pub fn with_measurements(mut self, n: usize) -> Self {
        self.cfg.num_measurements = n;
        self
    }
    pub fn with_poll_interval(mut self, d: Duration) -> Self {
        self.cfg.poll_interval = d;
        self
    }
    pub fn with_full_timeout(mut self, d: Option<Duration>) -> Self {
        self.cfg.full_timeout = d;
        self
    }
    /// Clock used for full-flag poll sleeps and deadlines.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn try_build(self) -> Result<DrainSession> {
        let module = self.module.ok_or(BuildError::MissingModule)?;
        DrainSession::spawn(module, self.cfg, shared_clock(self.clock))
    }
}

impl DrainSessionBuilder<Set> {
    pub fn build(self) -> Result<DrainSession> {
        self.try_build()
    }
}
