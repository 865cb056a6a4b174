//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "acqmon", version, about = "Background acquisition monitor")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON, log as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample the simulated source until the buffer is full or a read fails
    Monitor {
        /// Override monitor.capacity
        #[arg(long, value_name = "N")]
        capacity: Option<usize>,
        /// Override monitor.sample_period_ms
        #[arg(long = "period-ms", value_name = "MS")]
        period_ms: Option<u64>,
        /// Override simulation.fail_at (1-based read number)
        #[arg(long = "fail-at", value_name = "N")]
        fail_at: Option<u64>,
    },
    /// Drain a sequence from the simulated ping-pong module
    Drain {
        /// Override drain.num_measurements
        #[arg(long, value_name = "N")]
        measurements: Option<usize>,
    },
    /// Open both sessions, stop them and report
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn monitor_overrides_parse() {
        let cli = Cli::parse_from([
            "acqmon",
            "--json",
            "monitor",
            "--capacity",
            "5",
            "--period-ms",
            "10",
            "--fail-at",
            "3",
        ]);
        assert!(cli.json);
        assert!(cli.config.is_none());
        match cli.cmd {
            Commands::Monitor {
                capacity,
                period_ms,
                fail_at,
            } => {
                assert_eq!(capacity, Some(5));
                assert_eq!(period_ms, Some(10));
                assert_eq!(fail_at, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
