//! Session status shared by the monitor and drain workers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Externally visible state of a monitor or drain session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MonitorStatus {
    /// Worker not yet running (before the startup handshake).
    Uninitialized = 0,
    /// Worker waiting for a command.
    Idle = 1,
    /// Sampling (monitor) or draining a sequence (drain).
    Acquiring = 2,
    /// A hardware step failed; STOP or CLEAR recovers.
    Error = 3,
}

impl MonitorStatus {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MonitorStatus::Idle,
            2 => MonitorStatus::Acquiring,
            3 => MonitorStatus::Error,
            _ => MonitorStatus::Uninitialized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitorStatus::Uninitialized => "uninitialized",
            MonitorStatus::Idle => "idle",
            MonitorStatus::Acquiring => "acquiring",
            MonitorStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-writer-wins status slot, readable without locking.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl Default for StatusCell {
    fn default() -> Self {
        Self(AtomicU8::new(MonitorStatus::Uninitialized as u8))
    }
}

impl StatusCell {
    #[inline]
    pub fn load(&self) -> MonitorStatus {
        MonitorStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, s: MonitorStatus) {
        self.0.store(s as u8, Ordering::Release);
    }

    /// Poll until the status differs from `state` or `timeout` expires.
    /// Returns the last status observed.
    pub fn wait_while(
        &self,
        state: MonitorStatus,
        timeout: Duration,
        poll_interval: Duration,
    ) -> MonitorStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let s = self.load();
            if s != state || Instant::now() >= deadline {
                return s;
            }
            std::thread::sleep(poll_interval);
        }
    }
}
