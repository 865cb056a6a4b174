//! Triggers that pace a monitor worker.
//!
//! A trigger only calls its tick function; the session's tick function posts a
//! SAMPLE command and returns. Triggers never touch the sample buffer and
//! never wait on hardware.
//!
//! Safety: each `PeriodicTrigger` owns exactly one timer thread, which is shut
//! down and joined when the trigger is dropped.
use crate::error::{MonitorError, Result};
use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Callback fired on every tick.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

pub trait Trigger: Send {
    /// Start ticking every `period`. Re-arming restarts the schedule.
    fn arm(&mut self, period: Duration) -> Result<()>;
    /// Stop ticking. Idempotent.
    fn disarm(&mut self);
    fn is_armed(&self) -> bool;
}

/// Builds the trigger inside the worker thread, once the tick target exists.
pub trait TriggerFactory: Send {
    fn create(self: Box<Self>, tick: TickFn) -> Result<Box<dyn Trigger>>;
}

/// Factory for the wall-clock [`PeriodicTrigger`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Periodic;

impl TriggerFactory for Periodic {
    fn create(self: Box<Self>, tick: TickFn) -> Result<Box<dyn Trigger>> {
        Ok(Box::new(PeriodicTrigger::spawn(tick)?))
    }
}

enum TimerCtl {
    Arm(Duration),
    Disarm,
    Shutdown,
}

/// Timer thread that calls `tick` every period while armed.
pub struct PeriodicTrigger {
    ctl: xch::Sender<TimerCtl>,
    armed: bool,
    join_handle: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    pub fn spawn(tick: TickFn) -> Result<Self> {
        let (ctl, rx) = xch::unbounded();
        let join_handle = std::thread::Builder::new()
            .name("acqmon-trigger".into())
            .spawn(move || timer_loop(&rx, &tick))
            .map_err(|e| MonitorError::Setup(format!("spawn trigger thread: {e}")))?;
        Ok(Self {
            ctl,
            armed: false,
            join_handle: Some(join_handle),
        })
    }
}

fn timer_loop(rx: &xch::Receiver<TimerCtl>, tick: &TickFn) {
    let mut period: Option<Duration> = None;
    let mut next = Instant::now();
    loop {
        let msg = match period {
            None => rx.recv().ok(),
            Some(p) => match rx.recv_deadline(next) {
                Ok(m) => Some(m),
                Err(xch::RecvTimeoutError::Timeout) => {
                    tick();
                    let now = Instant::now();
                    next += p;
                    if next <= now {
                        // Fell behind; skip the missed ticks instead of bursting.
                        next = now + p;
                    }
                    continue;
                }
                Err(xch::RecvTimeoutError::Disconnected) => None,
            },
        };
        match msg {
            Some(TimerCtl::Arm(p)) => {
                period = Some(p);
                next = Instant::now() + p;
            }
            Some(TimerCtl::Disarm) => period = None,
            Some(TimerCtl::Shutdown) | None => break,
        }
    }
    tracing::trace!("trigger thread exiting cleanly");
}

impl Trigger for PeriodicTrigger {
    fn arm(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(MonitorError::Config("trigger period must be > 0".into()));
        }
        self.ctl
            .send(TimerCtl::Arm(period))
            .map_err(|_| MonitorError::Disconnected)?;
        self.armed = true;
        Ok(())
    }

    fn disarm(&mut self) {
        if self.armed {
            let _ = self.ctl.send(TimerCtl::Disarm);
            self.armed = false;
        }
    }

    fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for PeriodicTrigger {
    fn drop(&mut self) {
        let _ = self.ctl.send(TimerCtl::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("trigger thread panicked during shutdown");
            }
        }
    }
}

#[derive(Default)]
struct ManualShared {
    tick: Mutex<Option<TickFn>>,
    armed: AtomicBool,
    period: Mutex<Option<Duration>>,
}

/// Trigger fired by hand, for deterministic tests and single-stepping.
///
/// Keep one clone as the handle and pass [`ManualTicker::factory`] to the
/// session; [`ManualTicker::tick`] then fires exactly one tick while armed.
#[derive(Clone, Default)]
pub struct ManualTicker {
    shared: Arc<ManualShared>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Box<dyn TriggerFactory> {
        Box::new(self.clone())
    }

    /// Fire one tick. Returns false (and does nothing) while disarmed.
    pub fn tick(&self) -> bool {
        if !self.shared.armed.load(Ordering::Acquire) {
            return false;
        }
        let tick = self
            .shared
            .tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match tick {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    /// Period passed to the most recent `arm`.
    pub fn last_period(&self) -> Option<Duration> {
        *self
            .shared
            .period
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TriggerFactory for ManualTicker {
    fn create(self: Box<Self>, tick: TickFn) -> Result<Box<dyn Trigger>> {
        *self
            .shared
            .tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tick);
        Ok(Box::new(ManualTrigger {
            shared: self.shared.clone(),
        }))
    }
}

struct ManualTrigger {
    shared: Arc<ManualShared>,
}

impl Trigger for ManualTrigger {
    fn arm(&mut self, period: Duration) -> Result<()> {
        *self
            .shared
            .period
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(period);
        self.shared.armed.store(true, Ordering::Release);
        Ok(())
    }

    fn disarm(&mut self) {
        self.shared.armed.store(false, Ordering::Release);
    }

    fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_tick() -> (TickFn, Arc<AtomicUsize>) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = n.clone();
        let f: TickFn = Arc::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        (f, n)
    }

    #[test]
    fn periodic_trigger_ticks_only_while_armed() {
        let (tick, n) = counting_tick();
        let mut t = PeriodicTrigger::spawn(tick).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(n.load(Ordering::Relaxed), 0, "ticked before arm");

        t.arm(Duration::from_millis(2)).unwrap();
        assert!(t.is_armed());
        std::thread::sleep(Duration::from_millis(40));
        t.disarm();
        let after_disarm = n.load(Ordering::Relaxed);
        assert!(after_disarm >= 3, "expected several ticks, got {after_disarm}");

        std::thread::sleep(Duration::from_millis(20));
        // At most one tick could have been in flight when disarm was sent.
        assert!(n.load(Ordering::Relaxed) <= after_disarm + 1);
        assert!(!t.is_armed());
    }

    #[test]
    fn periodic_trigger_rejects_zero_period() {
        let (tick, _) = counting_tick();
        let mut t = PeriodicTrigger::spawn(tick).unwrap();
        assert!(matches!(
            t.arm(Duration::ZERO),
            Err(MonitorError::Config(_))
        ));
    }

    #[test]
    fn periodic_trigger_drop_is_prompt() {
        let (tick, _) = counting_tick();
        let mut t = PeriodicTrigger::spawn(tick).unwrap();
        t.arm(Duration::from_secs(10)).unwrap();
        let start = Instant::now();
        drop(t);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn manual_ticker_fires_only_when_armed() {
        let (tick, n) = counting_tick();
        let ticker = ManualTicker::new();
        let mut trig = ticker.factory().create(tick).unwrap();
        assert!(!ticker.tick());
        trig.arm(Duration::from_millis(10)).unwrap();
        assert_eq!(ticker.last_period(), Some(Duration::from_millis(10)));
        assert!(ticker.tick());
        assert!(ticker.tick());
        trig.disarm();
        assert!(!ticker.tick());
        assert_eq!(n.load(Ordering::Relaxed), 2);
    }
}
