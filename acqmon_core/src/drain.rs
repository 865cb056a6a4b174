//! Ping-pong drain of a multi-channel buffered module.
//!
//! The worker arms the module, then alternates between bank A and bank B:
//! poll until every active channel reports the bank full, copy each active
//! channel into its destination column under the data lock, acknowledge the
//! bank on every channel of the module, and publish the pixel counters. The
//! module is stopped when the sequence ends, however it ends.
//!
//! Safety: the worker is told to EXIT and joined when the session is dropped.
//! A pending full-flag poll notices EXIT on its next poll interval.
use crate::atomic::AtomicCounter;
use crate::command::{Command, CommandLink};
use crate::config::DrainCfg;
use crate::error::{MonitorError, Result};
use crate::hw_error::map_hw_error;
use crate::rendezvous::Rendezvous;
use crate::status::{MonitorStatus, StatusCell};
use crate::util::wait_until;
use acqmon_traits::clock::{Clock, MonotonicClock};
use acqmon_traits::{Bank, BufferedModule};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Per-channel destination: `measurements * scalers` values, measurement-major.
#[derive(Debug)]
struct Destination {
    columns: Vec<Vec<u32>>,
}

impl Destination {
    fn zero(&mut self) {
        for c in &mut self.columns {
            c.fill(0);
        }
    }
}

struct Shared {
    link: CommandLink,
    status: StatusCell,
    last_pixel: AtomicCounter,
    total_pixels: AtomicCounter,
    total_pixels_at_start: AtomicCounter,
    last_error: Mutex<Option<String>>,
    data: Mutex<Destination>,
    channels: Vec<usize>,
    scalers: usize,
    measurements: usize,
}

impl Shared {
    fn data(&self) -> MutexGuard<'_, Destination> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_last_error(&self, msg: Option<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = msg;
    }

    fn slot_of(&self, channel: usize) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }
}

pub struct DrainSession {
    shared: Arc<Shared>,
    command_timeout: Duration,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DrainSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainSession")
            .field("status", &self.status())
            .field("channels", &self.shared.channels)
            .field("last_pixel", &self.last_pixel())
            .field("total_pixels", &self.total_pixels())
            .finish_non_exhaustive()
    }
}

impl DrainSession {
    pub fn open<M>(module: M, cfg: DrainCfg) -> Result<Self>
    where
        M: BufferedModule + Send + 'static,
    {
        Self::spawn(module, cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn builder() -> crate::builder::DrainSessionBuilder {
        crate::builder::DrainSessionBuilder::default()
    }

    pub(crate) fn spawn<M>(module: M, cfg: DrainCfg, clock: SharedClock) -> Result<Self>
    where
        M: BufferedModule + Send + 'static,
    {
        cfg.validate()?;
        let module_channels = module.channels();
        if module_channels != cfg.channels_per_module {
            return Err(MonitorError::Setup(format!(
                "module has {module_channels} channels, config expects {}",
                cfg.channels_per_module
            )));
        }
        let scalers = module.scalers_per_channel();
        if scalers == 0 {
            return Err(MonitorError::Setup(
                "module reports zero scalers per channel".into(),
            ));
        }
        let column_len = cfg
            .num_measurements
            .checked_mul(scalers)
            .ok_or_else(|| MonitorError::Config("destination size overflows".into()))?;
        let shared = Arc::new(Shared {
            link: CommandLink::new(cfg.queue_depth),
            status: StatusCell::default(),
            last_pixel: AtomicCounter::new(-1),
            total_pixels: AtomicCounter::new(0),
            total_pixels_at_start: AtomicCounter::new(0),
            last_error: Mutex::new(None),
            data: Mutex::new(Destination {
                columns: vec![vec![0; column_len]; cfg.channels.len()],
            }),
            channels: cfg.channels.clone(),
            scalers,
            measurements: cfg.num_measurements,
        });
        let startup: Arc<Rendezvous<()>> = Arc::new(Rendezvous::mailbox());

        let worker = DrainWorker {
            module,
            shared: shared.clone(),
            clock,
            poll_interval: cfg.poll_interval,
            full_timeout: cfg.full_timeout,
            module_channels,
        };
        let worker_startup = startup.clone();
        let join_handle = std::thread::Builder::new()
            .name("acqmon-drain".into())
            .spawn(move || {
                worker.shared.status.store(MonitorStatus::Idle);
                worker_startup.send(());
                worker.run();
            })
            .map_err(|e| MonitorError::Setup(format!("spawn drain thread: {e}")))?;

        if startup.receive_timeout(cfg.command_timeout).is_none() {
            shared.link.exit();
            return Err(MonitorError::Setup(
                "drain worker did not report ready".into(),
            ));
        }
        tracing::debug!(
            channels = ?cfg.channels,
            measurements = cfg.num_measurements,
            scalers,
            "drain session open"
        );

        Ok(Self {
            shared,
            command_timeout: cfg.command_timeout,
            join_handle: Some(join_handle),
        })
    }

    /// Arm the module and start a sequence. A no-op while ACQUIRING or in ERROR.
    pub fn arm(&self) -> Result<MonitorStatus> {
        self.control(Command::Start)
    }

    /// Abort a running sequence (the module is stopped). Idempotent; recovers
    /// from ERROR.
    pub fn stop(&self) -> Result<MonitorStatus> {
        self.control(Command::Stop)
    }

    /// Abort, zero the destination and reset `last_pixel` to -1.
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

    /// Index of the last drained measurement, or -1.
    #[inline]
    pub fn last_pixel(&self) -> i32 {
        self.shared.last_pixel.read()
    }

    /// Measurements drained module-wide over the session's lifetime.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn total_pixels(&self) -> u32 {
        self.shared.total_pixels.read() as u32
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn total_pixels_at_start(&self) -> u32 {
        self.shared.total_pixels_at_start.read() as u32
    }

    pub fn channels(&self) -> &[usize] {
        &self.shared.channels
    }

    pub fn scalers_per_channel(&self) -> usize {
        self.shared.scalers
    }

    pub fn num_measurements(&self) -> usize {
        self.shared.measurements
    }

    /// Scaler values of one measurement on one active channel.
    pub fn measurement(&self, channel: usize, index: usize) -> Option<Vec<u32>> {
        let slot = self.shared.slot_of(channel)?;
        if index >= self.shared.measurements {
            return None;
        }
        let n = self.shared.scalers;
        let data = self.shared.data();
        data.columns
            .get(slot)
            .map(|c| c[index * n..(index + 1) * n].to_vec())
    }

    /// Whole destination column of an active channel, measurement-major.
    pub fn channel_data(&self, channel: usize) -> Option<Vec<u32>> {
        let slot = self.shared.slot_of(channel)?;
        self.shared.data().columns.get(slot).cloned()
    }

    /// Every active channel's column, in configured channel order.
    pub fn snapshot(&self) -> Vec<Vec<u32>> {
        self.shared.data().columns.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Poll until status leaves ACQUIRING or `timeout` passes.
    pub fn wait_until_done(&self, timeout: Duration) -> MonitorStatus {
        self.shared.status.wait_while(
            MonitorStatus::Acquiring,
            timeout,
            Duration::from_millis(1),
        )
    }

    pub fn close(mut self) -> Result<()> {
        if self.shutdown() {
            Ok(())
        } else {
            Err(MonitorError::Disconnected)
        }
    }

    fn shutdown(&mut self) -> bool {
        let Some(handle) = self.join_handle.take() else {
            return true;
        };
        self.shared.link.exit();
        match handle.join() {
            Ok(()) => {
                tracing::trace!("drain thread joined");
                true
            }
            Err(e) => {
                tracing::warn!(?e, "drain thread panicked");
                false
            }
        }
    }
}

impl Drop for DrainSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Why a sequence left its poll/copy loop early.
enum Halt {
    Command(Command),
    Failed(MonitorError),
}

impl From<MonitorError> for Halt {
    fn from(e: MonitorError) -> Self {
        Halt::Failed(e)
    }
}

struct DrainWorker<M> {
    module: M,
    shared: Arc<Shared>,
    clock: SharedClock,
    poll_interval: Duration,
    full_timeout: Option<Duration>,
    module_channels: usize,
}

impl<M: BufferedModule> DrainWorker<M> {
    fn run(mut self) {
        loop {
            let mut cmd = self.shared.link.next();
            // A sequence can hand back the command that interrupted it.
            loop {
                match cmd {
                    Command::Exit => {
                        tracing::debug!("drain worker exiting");
                        return;
                    }
                    Command::Start => {
                        if let Some(next) = self.on_arm() {
                            cmd = next;
                            continue;
                        }
                    }
                    Command::Stop => {
                        self.on_stop();
                        self.shared.link.acknowledge(self.shared.status.load());
                    }
                    Command::Clear => {
                        self.on_clear();
                        self.shared.link.acknowledge(self.shared.status.load());
                    }
                    Command::Sample => {
                        tracing::warn!("SAMPLE has no meaning for a drain session, ignored");
                    }
                }
                break;
            }
        }
    }

    /// Returns the command that interrupted the sequence, if any.
    fn on_arm(&mut self) -> Option<Command> {
        let status = self.shared.status.load();
        if matches!(status, MonitorStatus::Acquiring | MonitorStatus::Error) {
            tracing::warn!(%status, "ARM ignored");
            self.shared.link.acknowledge(status);
            return None;
        }
        self.shared.last_pixel.write(-1);
        self.shared
            .total_pixels_at_start
            .write(self.shared.total_pixels.read());
        self.shared.set_last_error(None);
        if let Err(e) = self.module.start_run() {
            self.fail(&map_hw_error(e.as_ref()));
            // a partly armed module must not keep filling
            if let Err(e) = self.module.stop_run() {
                let err = map_hw_error(e.as_ref());
                tracing::warn!(error = %err, "module stop failed after arm error");
            }
            self.shared.link.acknowledge(MonitorStatus::Error);
            return None;
        }
        self.shared.status.store(MonitorStatus::Acquiring);
        self.shared.link.acknowledge(MonitorStatus::Acquiring);
        tracing::debug!(
            measurements = self.shared.measurements,
            start = self.shared.total_pixels.read(),
            "drain sequence armed"
        );

        let outcome = self.sequence();
        let stopped = self.module.stop_run();
        match (outcome, stopped) {
            (Err(Halt::Command(cmd)), stopped) => {
                if let Err(e) = stopped {
                    let err = map_hw_error(e.as_ref());
                    tracing::warn!(error = %err, "module stop failed after abort");
                }
                tracing::debug!(
                    ?cmd,
                    pixel = self.shared.last_pixel.read(),
                    "drain sequence interrupted"
                );
                // STOP/CLEAR/EXIT are handled and acknowledged by the command loop.
                Some(cmd)
            }
            (Err(Halt::Failed(err)), _) => {
                self.fail(&err);
                None
            }
            (Ok(()), Err(e)) => {
                self.fail(&map_hw_error(e.as_ref()));
                None
            }
            (Ok(()), Ok(())) => {
                self.shared.status.store(MonitorStatus::Idle);
                tracing::debug!(
                    total_pixels = self.shared.total_pixels.read(),
                    "drain sequence complete"
                );
                None
            }
        }
    }

    fn sequence(&mut self) -> std::result::Result<(), Halt> {
        let mut bank = Bank::A;
        for pixel in 0..self.shared.measurements {
            self.wait_full(bank)?;
            self.copy_bank(bank, pixel)?;
            for ch in 0..self.module_channels {
                self.module
                    .buffer_done(ch, bank)
                    .map_err(|e| map_hw_error(e.as_ref()))?;
            }
            // `pixel` fits in i32: num_measurements is validated.
            let p = i32::try_from(pixel).unwrap_or(i32::MAX);
            self.shared.last_pixel.write(p);
            let total = self.shared.total_pixels.increment();
            tracing::trace!(pixel, %bank, total, "bank drained");
            bank = bank.other();
        }
        Ok(())
    }

    /// Poll until `bank` is full on every active channel, handling commands
    /// that arrive meanwhile.
    fn wait_full(&mut self, bank: Bank) -> std::result::Result<(), Halt> {
        let Self {
            module,
            shared,
            clock,
            poll_interval,
            full_timeout,
            ..
        } = self;
        wait_until(
            &**clock,
            *full_timeout,
            *poll_interval,
            || {
                while let Some(cmd) = shared.link.poll() {
                    match cmd {
                        Command::Stop | Command::Clear | Command::Exit => {
                            return Err(Halt::Command(cmd));
                        }
                        Command::Start => {
                            tracing::warn!("ARM ignored, sequence already running");
                            shared.link.acknowledge(MonitorStatus::Acquiring);
                        }
                        Command::Sample => {}
                    }
                }
                for &ch in &shared.channels {
                    let full = module
                        .buffer_full(ch, bank)
                        .map_err(|e| Halt::Failed(map_hw_error(e.as_ref())))?;
                    if !full {
                        return Ok(false);
                    }
                }
                Ok(true)
            },
            || {
                tracing::warn!(%bank, "timed out waiting for buffer full");
                Halt::Failed(MonitorError::Timeout)
            },
        )
    }

    fn copy_bank(&mut self, bank: Bank, pixel: usize) -> std::result::Result<(), Halt> {
        let n = self.shared.scalers;
        let range = pixel * n..(pixel + 1) * n;
        let mut data = self.shared.data();
        for (slot, &ch) in self.shared.channels.iter().enumerate() {
            let out = &mut data.columns[slot][range.clone()];
            self.module
                .read_buffer(ch, bank, out)
                .map_err(|e| map_hw_error(e.as_ref()))?;
        }
        Ok(())
    }

    fn on_stop(&mut self) {
        let status = self.shared.status.load();
        if status == MonitorStatus::Idle {
            tracing::debug!("STOP while idle");
            return;
        }
        self.shared.status.store(MonitorStatus::Idle);
        tracing::debug!(from = %status, status = %MonitorStatus::Idle, "drain stopped");
    }

    fn on_clear(&mut self) {
        self.shared.data().zero();
        self.shared.last_pixel.write(-1);
        self.shared.set_last_error(None);
        self.shared.status.store(MonitorStatus::Idle);
        tracing::debug!(status = %MonitorStatus::Idle, "drain cleared");
    }

    fn fail(&mut self, err: &MonitorError) {
        self.shared.set_last_error(Some(err.to_string()));
        self.shared.status.store(MonitorStatus::Error);
        tracing::error!(
            error = %err,
            pixel = self.shared.last_pixel.read(),
            status = %MonitorStatus::Error,
            "drain failed"
        );
    }
}
