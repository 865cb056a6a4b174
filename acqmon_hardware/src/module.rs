//! Simulated ping-pong acquisition module.
//!
//! A filler thread plays the part of the hardware: it fills bank A on every
//! channel, then bank B, then A again, stalling whenever the bank it is about
//! to fill still holds data that has not been acknowledged on every channel.

use crate::error::HwError;
use acqmon_traits::{Bank, BufferedModule, HwResult};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Value the simulated hardware stores for one scaler of one measurement.
#[inline]
pub fn expected_value(measurement: u64, channel: usize, scaler: usize) -> u32 {
    (measurement as u32)
        .wrapping_mul(1000)
        .wrapping_add((channel as u32).wrapping_mul(100))
        .wrapping_add(scaler as u32)
}

#[derive(Debug, Clone)]
struct BankSlot {
    full: bool,
    measurement: u64,
    data: Vec<u32>,
}

#[derive(Debug)]
struct State {
    scalers: usize,
    banks: Vec<[BankSlot; 2]>,
    running: bool,
    shutdown: bool,
    run_epoch: u64,
    next_measurement: u64,
    fill_bank: Bank,
    fill_interval: Duration,
    fail_read_at: Option<u64>,
    reads: Vec<(u64, usize)>,
    stops: usize,
    acks: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    cv: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[inline]
fn slot(bank: Bank) -> usize {
    match bank {
        Bank::A => 0,
        Bank::B => 1,
    }
}

pub struct SimulatedModule {
    shared: Arc<Shared>,
    channels: usize,
    scalers: usize,
    filler: Option<JoinHandle<()>>,
}

impl SimulatedModule {
    pub fn new(channels: usize, scalers: usize) -> Self {
        let empty = BankSlot {
            full: false,
            measurement: 0,
            data: vec![0; scalers],
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                scalers,
                banks: vec![[empty.clone(), empty]; channels],
                running: false,
                shutdown: false,
                run_epoch: 0,
                next_measurement: 0,
                fill_bank: Bank::A,
                fill_interval: Duration::ZERO,
                fail_read_at: None,
                reads: Vec::new(),
                stops: 0,
                acks: 0,
            }),
            cv: Condvar::new(),
        });
        let filler_shared = shared.clone();
        let filler = std::thread::Builder::new()
            .name("sim-module-fill".into())
            .spawn(move || fill_loop(&filler_shared))
            .ok();
        if filler.is_none() {
            tracing::error!("failed to spawn simulated module filler thread");
        }
        Self {
            shared,
            channels,
            scalers,
            filler,
        }
    }

    /// Time the "hardware" spends acquiring each bank.
    pub fn fill_interval(self, d: Duration) -> Self {
        self.shared.lock().fill_interval = d;
        self
    }

    /// Fail `read_buffer` for the given measurement number.
    pub fn fail_read_at(self, measurement: u64) -> Self {
        self.shared.lock().fail_read_at = Some(measurement);
        self
    }

    /// Observation handle that stays valid after the module is moved into a worker.
    pub fn probe(&self) -> ModuleProbe {
        ModuleProbe {
            shared: self.shared.clone(),
        }
    }

    fn check_channel(&self, channel: usize) -> Result<(), HwError> {
        if channel >= self.channels {
            return Err(HwError::InvalidChannel(channel));
        }
        Ok(())
    }
}

fn fill_loop(shared: &Shared) {
    let mut st = shared.lock();
    loop {
        if st.shutdown {
            break;
        }
        if !st.running {
            st = shared.cv.wait(st).unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let bank = st.fill_bank;
        if st.banks.iter().any(|b| b[slot(bank)].full) {
            // Backpressure: the drain has not acknowledged this bank yet.
            st = shared.cv.wait(st).unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let interval = st.fill_interval;
        let epoch = st.run_epoch;
        if !interval.is_zero() {
            // Acquisition time; stop, re-arm and shutdown cut it short.
            let deadline = Instant::now() + interval;
            loop {
                let now = Instant::now();
                if st.shutdown || !st.running || st.run_epoch != epoch || now >= deadline {
                    break;
                }
                st = shared
                    .cv
                    .wait_timeout(st, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            if st.shutdown {
                break;
            }
            if !st.running || st.run_epoch != epoch {
                continue;
            }
        }
        let m = st.next_measurement;
        let scalers = st.scalers;
        for (ch, banks) in st.banks.iter_mut().enumerate() {
            let s = &mut banks[slot(bank)];
            for (i, v) in s.data.iter_mut().enumerate().take(scalers) {
                *v = expected_value(m, ch, i);
            }
            s.measurement = m;
            s.full = true;
        }
        tracing::trace!(measurement = m, %bank, "simulated module filled bank");
        st.next_measurement += 1;
        st.fill_bank = bank.other();
        shared.cv.notify_all();
    }
}

impl BufferedModule for SimulatedModule {
    fn channels(&self) -> usize {
        self.channels
    }

    fn scalers_per_channel(&self) -> usize {
        self.scalers
    }

    fn start_run(&mut self) -> HwResult<()> {
        let mut st = self.shared.lock();
        for banks in &mut st.banks {
            for s in banks.iter_mut() {
                s.full = false;
            }
        }
        st.next_measurement = 0;
        st.fill_bank = Bank::A;
        st.run_epoch += 1;
        st.running = true;
        self.shared.cv.notify_all();
        Ok(())
    }

    fn buffer_full(&mut self, channel: usize, bank: Bank) -> HwResult<bool> {
        self.check_channel(channel)?;
        let st = self.shared.lock();
        let full = st.banks[channel][slot(bank)].full;
        if !full && !st.running {
            return Err(Box::new(HwError::NotRunning));
        }
        Ok(full)
    }

    fn read_buffer(&mut self, channel: usize, bank: Bank, out: &mut [u32]) -> HwResult<()> {
        self.check_channel(channel)?;
        let mut st = self.shared.lock();
        let s = &st.banks[channel][slot(bank)];
        if !s.full {
            return Err(Box::new(HwError::Device(format!(
                "{bank} of channel {channel} read before it was full"
            ))));
        }
        let m = s.measurement;
        if st.fail_read_at == Some(m) {
            return Err(Box::new(HwError::Device(format!(
                "injected read failure at measurement {m}"
            ))));
        }
        let n = out.len().min(s.data.len());
        out[..n].copy_from_slice(&s.data[..n]);
        st.reads.push((m, channel));
        Ok(())
    }

    fn buffer_done(&mut self, channel: usize, bank: Bank) -> HwResult<()> {
        self.check_channel(channel)?;
        let mut st = self.shared.lock();
        st.banks[channel][slot(bank)].full = false;
        st.acks += 1;
        self.shared.cv.notify_all();
        Ok(())
    }

    fn stop_run(&mut self) -> HwResult<()> {
        let mut st = self.shared.lock();
        st.running = false;
        st.stops += 1;
        self.shared.cv.notify_all();
        Ok(())
    }
}

impl Drop for SimulatedModule {
    fn drop(&mut self) {
        {
            let mut st = self.shared.lock();
            st.shutdown = true;
            self.shared.cv.notify_all();
        }
        if let Some(handle) = self.filler.take()
            && handle.join().is_err()
        {
            tracing::warn!("simulated module filler thread panicked");
        }
    }
}

/// Read-only view of what the simulated hardware saw.
#[derive(Clone)]
pub struct ModuleProbe {
    shared: Arc<Shared>,
}

impl ModuleProbe {
    /// Every successful `read_buffer` as `(measurement, channel)`, in call order.
    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.shared.lock().reads.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.shared.lock().stops
    }

    pub fn ack_count(&self) -> usize {
        self.shared.lock().acks
    }

    /// Measurements the hardware has produced in the current run.
    pub fn filled(&self) -> u64 {
        self.shared.lock().next_measurement
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}
