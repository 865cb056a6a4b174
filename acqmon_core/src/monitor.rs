//! Single-channel background monitor.
//!
//! A `MonitorSession` owns one worker thread that owns the device. A trigger
//! posts SAMPLE commands on a bounded queue; the worker performs the blocking
//! read, writes the next buffer slot and publishes progress through lock-free
//! counters. Controllers talk to the worker with START/STOP/CLEAR and wait for
//! an acknowledgement carrying the resulting status.
//!
//! Safety: the worker is told to EXIT and joined when the session is dropped,
//! so no thread outlives its session. A read that hangs in the device blocks
//! that join until it returns.
use crate::atomic::AtomicCounter;
use crate::buffer::SampleBuffer;
use crate::command::{Command, CommandLink};
use crate::config::MonitorCfg;
use crate::error::{MonitorError, Result};
use crate::hw_error::map_hw_error;
use crate::rendezvous::Rendezvous;
use crate::status::{MonitorStatus, StatusCell};
use crate::trigger::{Periodic, TickFn, Trigger, TriggerFactory};
use acqmon_traits::ValueSource;
use acqmon_traits::clock::{Clock, MonotonicClock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type SharedClock = Arc<dyn Clock + Send + Sync>;

struct Shared {
    link: CommandLink,
    status: StatusCell,
    last_index: AtomicCounter,
    total_count: AtomicCounter,
    ticks_processed: AtomicU64,
    missed_ticks: AtomicU64,
    last_ok_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
    buffer: SampleBuffer,
}

impl Shared {
    fn set_last_error(&self, msg: Option<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = msg;
    }
}

pub struct MonitorSession {
    shared: Arc<Shared>,
    command_timeout: Duration,
    clock: SharedClock,
    epoch: Instant,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("status", &self.status())
            .field("last_index", &self.last_index())
            .field("total_count", &self.total_count())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl MonitorSession {
    /// Open a session driven by a wall-clock periodic trigger.
    pub fn open<D>(device: D, cfg: MonitorCfg) -> Result<Self>
    where
        D: ValueSource + Send + 'static,
    {
        Self::spawn(
            device,
            cfg,
            Box::new(Periodic),
            Arc::new(MonotonicClock::new()),
        )
    }

    pub fn builder() -> crate::builder::MonitorSessionBuilder {
        crate::builder::MonitorSessionBuilder::default()
    }

    /// Spawn the worker and block until it reports ready (or `command_timeout`).
    pub(crate) fn spawn<D>(
        device: D,
        cfg: MonitorCfg,
        trigger: Box<dyn TriggerFactory>,
        clock: SharedClock,
    ) -> Result<Self>
    where
        D: ValueSource + Send + 'static,
    {
        cfg.validate()?;
        let shared = Arc::new(Shared {
            link: CommandLink::new(cfg.queue_depth),
            status: StatusCell::default(),
            last_index: AtomicCounter::new(-1),
            total_count: AtomicCounter::new(0),
            ticks_processed: AtomicU64::new(0),
            missed_ticks: AtomicU64::new(0),
            last_ok_ms: AtomicU64::new(0),
            last_error: Mutex::new(None),
            buffer: SampleBuffer::new(cfg.capacity),
        });
        let startup: Arc<Rendezvous<std::result::Result<(), String>>> =
            Arc::new(Rendezvous::mailbox());
        let epoch = clock.now();

        let worker_shared = shared.clone();
        let worker_startup = startup.clone();
        let worker_clock = clock.clone();
        let period = cfg.sample_period;
        let join_handle = std::thread::Builder::new()
            .name("acqmon-monitor".into())
            .spawn(move || {
                let tick_shared = worker_shared.clone();
                let tick: TickFn = Arc::new(move || post_sample(&tick_shared));
                let trigger = match trigger.create(tick) {
                    Ok(t) => t,
                    Err(e) => {
                        worker_startup.send(Err(e.to_string()));
                        return;
                    }
                };
                let worker = Worker {
                    device,
                    shared: worker_shared,
                    trigger,
                    period,
                    clock: worker_clock,
                    epoch,
                };
                worker.shared.status.store(MonitorStatus::Idle);
                worker_startup.send(Ok(()));
                worker.run();
            })
            .map_err(|e| MonitorError::Setup(format!("spawn monitor thread: {e}")))?;

        match startup.receive_timeout(cfg.command_timeout) {
            Some(Ok(())) => {}
            Some(Err(msg)) => {
                let _ = join_handle.join();
                return Err(MonitorError::Setup(msg));
            }
            None => {
                // Never reported ready: queue an EXIT and detach.
                shared.link.exit();
                return Err(MonitorError::Setup(
                    "monitor worker did not report ready".into(),
                ));
            }
        }
        tracing::debug!(
            capacity = cfg.capacity,
            period_ms = crate::util::duration_ms(period),
            "monitor session open"
        );

        Ok(Self {
            shared,
            command_timeout: cfg.command_timeout,
            clock,
            epoch,
            join_handle: Some(join_handle),
        })
    }

    /// Arm sampling. A no-op while already ACQUIRING or in ERROR.
    pub fn start(&self) -> Result<MonitorStatus> {
        self.control(Command::Start)
    }

    /// Disarm sampling. Idempotent; also recovers from ERROR.
    pub fn stop(&self) -> Result<MonitorStatus> {
        self.control(Command::Stop)
    }

    /// Disarm, zero the buffer and reset `last_index` to -1.
    /// `total_count` is untouched.
    pub fn clear(&self) -> Result<MonitorStatus> {
        self.control(Command::Clear)
    }

    fn control(&self, cmd: Command) -> Result<MonitorStatus> {
        self.shared
            .link
            .request(cmd, self.command_timeout, || self.worker_gone())
    }

    fn worker_gone(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    #[inline]
    pub fn status(&self) -> MonitorStatus {
        self.shared.status.load()
    }

    /// Index of the most recently written slot, or -1.
    #[inline]
    pub fn last_index(&self) -> i32 {
        self.shared.last_index.read()
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn total_count(&self) -> u32 {
        self.shared.total_count.read() as u32
    }

    pub fn capacity(&self) -> usize {
        self.shared.buffer.capacity()
    }

    pub fn read_buffer(&self, index: usize) -> Option<f64> {
        self.shared.buffer.get(index)
    }

    /// Slots `0..=last_index`, every one fully written.
    pub fn read_all(&self) -> Vec<f64> {
        let last = self.last_index();
        usize::try_from(last.saturating_add(1))
            .map(|len| self.shared.buffer.prefix(len))
            .unwrap_or_default()
    }

    /// Every slot, written or not.
    pub fn snapshot(&self) -> Vec<f64> {
        self.shared.buffer.snapshot()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Trigger ticks dropped because a SAMPLE was already pending.
    pub fn missed_ticks(&self) -> u64 {
        self.shared.missed_ticks.load(Ordering::Relaxed)
    }

    /// SAMPLE commands handled while ACQUIRING.
    pub fn ticks_processed(&self) -> u64 {
        self.shared.ticks_processed.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.shared.last_ok_ms.load(Ordering::Relaxed))
    }

    /// Milliseconds since the last successful read, on the session's clock.
    pub fn stalled_for_now(&self) -> u64 {
        self.stalled_for(self.clock.ms_since(self.epoch))
    }

    /// Poll until status leaves ACQUIRING or `timeout` passes.
    pub fn wait_while_acquiring(&self, timeout: Duration) -> MonitorStatus {
        self.shared.status.wait_while(
            MonitorStatus::Acquiring,
            timeout,
            Duration::from_millis(1),
        )
    }

    /// Stop the worker and join it.
    pub fn close(mut self) -> Result<()> {
        if self.shutdown() {
            Ok(())
        } else {
            Err(MonitorError::Disconnected)
        }
    }

    /// Returns false if the worker panicked.
    fn shutdown(&mut self) -> bool {
        let Some(handle) = self.join_handle.take() else {
            return true;
        };
        self.shared.link.exit();
        match handle.join() {
            Ok(()) => {
                tracing::trace!("monitor thread joined");
                true
            }
            Err(e) => {
                tracing::warn!(?e, "monitor thread panicked");
                false
            }
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn post_sample(shared: &Shared) {
    if !shared.link.offer_sample() {
        let missed = shared.missed_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(missed, "sample tick coalesced");
    }
}

struct Worker<D> {
    device: D,
    shared: Arc<Shared>,
    trigger: Box<dyn Trigger>,
    period: Duration,
    clock: SharedClock,
    epoch: Instant,
}

impl<D: ValueSource> Worker<D> {
    fn run(mut self) {
        loop {
            let cmd = self.shared.link.next();
            match cmd {
                Command::Sample => {
                    self.on_sample();
                    continue;
                }
                Command::Exit => {
                    tracing::debug!("monitor worker exiting");
                    self.trigger.disarm();
                    break;
                }
                Command::Start => self.on_start(),
                Command::Stop => self.on_stop(),
                Command::Clear => self.on_clear(),
            }
            self.shared.link.acknowledge(self.shared.status.load());
        }
    }

    fn on_start(&mut self) {
        let status = self.shared.status.load();
        if matches!(status, MonitorStatus::Acquiring | MonitorStatus::Error) {
            tracing::warn!(%status, "START ignored");
            return;
        }
        self.shared.last_index.write(-1);
        self.shared.set_last_error(None);
        self.shared.status.store(MonitorStatus::Acquiring);
        if let Err(e) = self.trigger.arm(self.period) {
            self.fail(&e);
            return;
        }
        tracing::debug!(status = %MonitorStatus::Acquiring, "monitor started");
    }

    fn on_stop(&mut self) {
        self.trigger.disarm();
        let status = self.shared.status.load();
        if status == MonitorStatus::Idle {
            tracing::debug!("STOP while idle");
            return;
        }
        self.shared.status.store(MonitorStatus::Idle);
        tracing::debug!(from = %status, status = %MonitorStatus::Idle, "monitor stopped");
    }

    fn on_clear(&mut self) {
        self.trigger.disarm();
        self.shared.buffer.zero();
        self.shared.last_index.write(-1);
        self.shared.set_last_error(None);
        self.shared.status.store(MonitorStatus::Idle);
        tracing::debug!(status = %MonitorStatus::Idle, "monitor cleared");
    }

    fn on_sample(&mut self) {
        if self.shared.status.load() != MonitorStatus::Acquiring {
            tracing::trace!("stale SAMPLE ignored");
            return;
        }
        self.sample_once();
        self.shared.ticks_processed.fetch_add(1, Ordering::Release);
    }

    fn sample_once(&mut self) {
        let capacity = self.shared.buffer.capacity();
        let last = self.shared.last_index.read();
        let Some(next) = usize::try_from(last.saturating_add(1))
            .ok()
            .filter(|&n| n < capacity)
        else {
            self.auto_stop();
            return;
        };

        match self.device.read_value() {
            Ok(value) => {
                self.shared.buffer.set(next, value);
                self.shared.last_index.write(last + 1);
                self.shared.total_count.increment();
                self.shared
                    .last_ok_ms
                    .store(self.clock.ms_since(self.epoch), Ordering::Relaxed);
                tracing::trace!(index = next, value, "sample");
                if next + 1 >= capacity {
                    self.auto_stop();
                }
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                self.fail(&err);
            }
        }
    }

    fn auto_stop(&mut self) {
        self.trigger.disarm();
        self.shared.status.store(MonitorStatus::Idle);
        tracing::debug!(
            index = self.shared.last_index.read(),
            "buffer full, monitor auto-stopped"
        );
    }

    fn fail(&mut self, err: &MonitorError) {
        self.trigger.disarm();
        self.shared.set_last_error(Some(err.to_string()));
        self.shared.status.store(MonitorStatus::Error);
        tracing::error!(
            error = %err,
            index = self.shared.last_index.read(),
            status = %MonitorStatus::Error,
            "monitor read failed"
        );
    }
}
