#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the acquisition monitor.
//!
//! `Config` and its sections are deserialized from TOML; every section has
//! defaults so a minimal file is valid. Call [`Config::validate`] before use.
use serde::Deserialize;

/// Single-channel monitor session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorCfg {
    /// Number of sample slots (auto-stop when full).
    pub capacity: usize,
    /// Trigger period in milliseconds.
    pub sample_period_ms: u64,
    /// Max wait for the worker to acknowledge a command.
    pub command_timeout_ms: u64,
    /// Command queue depth (>= 2).
    pub queue_depth: usize,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            capacity: 1000,
            sample_period_ms: 100,
            command_timeout_ms: 2000,
            queue_depth: 4,
        }
    }
}

/// Ping-pong drain session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrainCfg {
    /// Active channel indices on the module.
    pub channels: Vec<usize>,
    pub channels_per_module: usize,
    pub scalers_per_channel: usize,
    pub num_measurements: usize,
    /// Sleep between "buffer full" polls.
    pub poll_ms: u64,
    /// Give up on a full-flag poll after this long; 0 waits forever.
    pub full_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub queue_depth: usize,
}

impl Default for DrainCfg {
    fn default() -> Self {
        Self {
            channels: vec![0, 1, 2, 3],
            channels_per_module: 4,
            scalers_per_channel: 4,
            num_measurements: 100,
            poll_ms: 100,
            full_timeout_ms: 0,
            command_timeout_ms: 2000,
            queue_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Simulated hardware used by the CLI when no real endpoint is wired in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// Values returned by the simulated source, cycled. Empty: a 1, 2, 3... ramp.
    pub values: Vec<f64>,
    /// Fail the read on this 1-based tick.
    pub fail_at: Option<u64>,
    /// How the injected failure is reported: "device" | "timeout" (default: device)
    pub fault: Option<String>,
    /// Time the simulated module spends filling each bank.
    pub fill_ms: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            fail_at: None,
            fault: None,
            fill_ms: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorCfg,
    #[serde(default)]
    pub drain: DrainCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: Simulation,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Monitor
        let m = &self.monitor;
        if m.capacity == 0 {
            eyre::bail!("monitor.capacity must be >= 1");
        }
        if i32::try_from(m.capacity).is_err() {
            eyre::bail!("monitor.capacity must fit in a 32-bit index");
        }
        if m.sample_period_ms == 0 {
            eyre::bail!("monitor.sample_period_ms must be >= 1");
        }
        if m.command_timeout_ms == 0 {
            eyre::bail!("monitor.command_timeout_ms must be >= 1");
        }
        if m.queue_depth < 2 {
            eyre::bail!("monitor.queue_depth must be >= 2");
        }

        // Drain
        let d = &self.drain;
        if d.channels_per_module == 0 {
            eyre::bail!("drain.channels_per_module must be >= 1");
        }
        if d.channels.is_empty() {
            eyre::bail!("drain.channels must not be empty");
        }
        if let Some(ch) = d.channels.iter().find(|&&c| c >= d.channels_per_module) {
            eyre::bail!(
                "drain.channels entry {} is out of range (channels_per_module = {})",
                ch,
                d.channels_per_module
            );
        }
        let mut seen = d.channels.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != d.channels.len() {
            eyre::bail!("drain.channels must not contain duplicates");
        }
        if d.scalers_per_channel == 0 {
            eyre::bail!("drain.scalers_per_channel must be >= 1");
        }
        if d.num_measurements == 0 {
            eyre::bail!("drain.num_measurements must be >= 1");
        }
        if i32::try_from(d.num_measurements).is_err() {
            eyre::bail!("drain.num_measurements must fit in a 32-bit index");
        }
        if d.poll_ms == 0 {
            eyre::bail!("drain.poll_ms must be >= 1");
        }
        if d.command_timeout_ms == 0 {
            eyre::bail!("drain.command_timeout_ms must be >= 1");
        }
        if d.queue_depth < 2 {
            eyre::bail!("drain.queue_depth must be >= 2");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }
        if let Some(level) = self.logging.level.as_deref()
            && !matches!(
                level.to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error" | "off"
            )
        {
            eyre::bail!("logging.level must be a tracing level, got {level:?}");
        }

        // Simulation
        if self.simulation.fail_at == Some(0) {
            eyre::bail!("simulation.fail_at is 1-based and must be >= 1");
        }
        if let Some(fault) = self.simulation.fault.as_deref()
            && !matches!(fault, "device" | "timeout")
        {
            eyre::bail!("simulation.fault must be one of device|timeout, got {fault:?}");
        }
        if self.simulation.values.iter().any(|v| !v.is_finite()) {
            eyre::bail!("simulation.values must be finite");
        }
        Ok(())
    }
}
