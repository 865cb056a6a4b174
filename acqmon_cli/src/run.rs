//! Session execution against the simulated hardware, plus result printing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use acqmon_core::{DrainSession, MonitorError, MonitorSession, MonitorStatus};
use acqmon_hardware::{FaultKind, RampSource, SimulatedModule, SimulatedSource};
use acqmon_traits::ValueSource;
use serde_json::json;

/// How often the foreground loop checks for Ctrl-C while a session runs.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A session that finished in ERROR; carries the worker's failure message.
#[derive(Debug)]
pub struct SessionFailed {
    pub session: &'static str,
    pub message: String,
}

impl SessionFailed {
    /// True when the failure was a hardware read that timed out.
    pub fn timed_out(&self) -> bool {
        self.message == MonitorError::Timeout.to_string()
    }
}

impl std::fmt::Display for SessionFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} session ended in error: {}", self.session, self.message)
    }
}

impl std::error::Error for SessionFailed {}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[allow(clippy::cast_precision_loss)]
fn simulated_source(
    sim: &acqmon_config::Simulation,
    capacity: usize,
) -> Box<dyn ValueSource + Send> {
    if sim.values.is_empty() && sim.fail_at.is_none() {
        return Box::new(RampSource::new(1.0, 1.0));
    }
    let values = if sim.values.is_empty() {
        (1..=capacity).map(|i| i as f64).collect()
    } else {
        sim.values.clone()
    };
    let mut src = SimulatedSource::new(values);
    if let Some(n) = sim.fail_at {
        src = src.fail_at(usize::try_from(n).unwrap_or(usize::MAX));
    }
    if sim.fault.as_deref() == Some("timeout") {
        src = src.fault_kind(FaultKind::Timeout);
    }
    Box::new(src)
}

fn simulated_module(cfg: &acqmon_config::Config) -> SimulatedModule {
    SimulatedModule::new(cfg.drain.channels_per_module, cfg.drain.scalers_per_channel)
        .fill_interval(Duration::from_millis(cfg.simulation.fill_ms))
}

/// Run a monitor session until it leaves ACQUIRING (auto-stop or failure) or
/// Ctrl-C stops it, then print what was acquired.
pub fn run_monitor(
    cfg: &acqmon_config::Config,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let device = simulated_source(&cfg.simulation, cfg.monitor.capacity);
    let session = MonitorSession::open(device, (&cfg.monitor).into())?;
    let t0 = Instant::now();
    tracing::info!(
        capacity = cfg.monitor.capacity,
        period_ms = cfg.monitor.sample_period_ms,
        "monitor start"
    );
    session.start()?;

    let mut status = session.status();
    while status == MonitorStatus::Acquiring {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!("interrupted; stopping monitor");
            status = session.stop()?;
            break;
        }
        status = session.wait_while_acquiring(WAIT_SLICE);
    }

    let samples = session.read_all();
    let last_error = session.last_error();
    let duration_ms = u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        status = %status,
        last_index = session.last_index(),
        total_count = session.total_count(),
        "monitor finished"
    );

    if json {
        let line = json!({
            "timestamp": unix_ts(),
            "command": "monitor",
            "status": status.as_str(),
            "last_index": session.last_index(),
            "total_count": session.total_count(),
            "missed_ticks": session.missed_ticks(),
            "duration_ms": duration_ms,
            "samples": samples,
            "error": last_error,
        });
        println!("{line}");
    } else {
        println!(
            "monitor: status={status} last_index={} total_count={} missed_ticks={}",
            session.last_index(),
            session.total_count(),
            session.missed_ticks()
        );
        for (i, v) in samples.iter().enumerate() {
            println!("  [{i}] {v}");
        }
    }
    session.close()?;

    if status == MonitorStatus::Error {
        return Err(SessionFailed {
            session: "monitor",
            message: last_error.unwrap_or_default(),
        }
        .into());
    }
    Ok(())
}

/// Arm one drain sequence on the simulated module and print every active
/// channel's data once the sequence ends.
pub fn run_drain(
    cfg: &acqmon_config::Config,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let session = DrainSession::open(simulated_module(cfg), (&cfg.drain).into())?;
    let t0 = Instant::now();
    tracing::info!(
        channels = ?cfg.drain.channels,
        measurements = cfg.drain.num_measurements,
        "drain start"
    );
    session.arm()?;

    let mut status = session.status();
    while status == MonitorStatus::Acquiring {
        if shutdown.load(Ordering::Relaxed) {
            tracing::warn!("interrupted; stopping drain");
            status = session.stop()?;
            break;
        }
        status = session.wait_until_done(WAIT_SLICE);
    }

    let last_error = session.last_error();
    let duration_ms = u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX);
    // only the measurements actually drained
    let drained = usize::try_from(session.last_pixel() + 1).unwrap_or(0);
    let per_channel: Vec<(usize, Vec<Vec<u32>>)> = session
        .channels()
        .iter()
        .map(|&ch| {
            let rows = (0..drained)
                .filter_map(|m| session.measurement(ch, m))
                .collect();
            (ch, rows)
        })
        .collect();
    tracing::info!(
        status = %status,
        last_pixel = session.last_pixel(),
        total_pixels = session.total_pixels(),
        "drain finished"
    );

    if json {
        let channels: Vec<_> = per_channel
            .iter()
            .map(|(ch, rows)| json!({ "channel": ch, "measurements": rows }))
            .collect();
        let line = json!({
            "timestamp": unix_ts(),
            "command": "drain",
            "status": status.as_str(),
            "last_pixel": session.last_pixel(),
            "total_pixels": session.total_pixels(),
            "total_pixels_at_start": session.total_pixels_at_start(),
            "duration_ms": duration_ms,
            "channels": channels,
            "error": last_error,
        });
        println!("{line}");
    } else {
        println!(
            "drain: status={status} last_pixel={} total_pixels={} total_pixels_at_start={}",
            session.last_pixel(),
            session.total_pixels(),
            session.total_pixels_at_start()
        );
        for (ch, rows) in &per_channel {
            println!("channel {ch}:");
            for (m, row) in rows.iter().enumerate() {
                let cells: Vec<String> = row.iter().map(u32::to_string).collect();
                println!("  [{m}] {}", cells.join(" "));
            }
        }
    }
    session.close()?;

    if status == MonitorStatus::Error {
        return Err(SessionFailed {
            session: "drain",
            message: last_error.unwrap_or_default(),
        }
        .into());
    }
    Ok(())
}

/// Open both sessions on simulated hardware, STOP each and check it is IDLE.
pub fn self_check(cfg: &acqmon_config::Config, json: bool) -> eyre::Result<()> {
    let monitor = MonitorSession::open(
        simulated_source(&cfg.simulation, cfg.monitor.capacity),
        (&cfg.monitor).into(),
    )?;
    let monitor_status = monitor.stop()?;
    monitor.close()?;

    let drain = DrainSession::open(simulated_module(cfg), (&cfg.drain).into())?;
    let drain_status = drain.stop()?;
    drain.close()?;

    if monitor_status != MonitorStatus::Idle || drain_status != MonitorStatus::Idle {
        eyre::bail!(
            "self-check failed: monitor={monitor_status} drain={drain_status} after STOP"
        );
    }
    tracing::info!("self-check ok");
    if json {
        println!(
            "{}",
            json!({ "command": "self-check", "monitor": "idle", "drain": "idle", "ok": true })
        );
    } else {
        println!("self-check OK (monitor: idle, drain: idle)");
    }
    Ok(())
}
