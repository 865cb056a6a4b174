#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    let mut cfg = match cli.config.as_deref() {
        Some(path) => acqmon_config::load_file(path)?,
        None => acqmon_config::Config::default(),
    };
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    match cli.cmd {
        Commands::Monitor {
            capacity,
            period_ms,
            fail_at,
        } => {
            if let Some(n) = capacity {
                cfg.monitor.capacity = n;
            }
            if let Some(ms) = period_ms {
                cfg.monitor.sample_period_ms = ms;
            }
            if fail_at.is_some() {
                cfg.simulation.fail_at = fail_at;
            }
            cfg.validate()?;
            run::run_monitor(&cfg, cli.json, &shutdown)
        }
        Commands::Drain { measurements } => {
            if let Some(n) = measurements {
                cfg.drain.num_measurements = n;
            }
            cfg.validate()?;
            run::run_drain(&cfg, cli.json, &shutdown)
        }
        Commands::SelfCheck => run::self_check(&cfg, cli.json),
    }
}

/// Console logs go to stderr so stdout stays machine-readable.
/// Filter precedence: `RUST_LOG`, then `--log-level`, then `[logging].level`.
fn init_tracing(
    json: bool,
    cli_level: Option<&str>,
    logging: &acqmon_config::Logging,
) -> Result<()> {
    let level = cli_level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let pretty = (!json).then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));
    let jsonl = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(jsonl)
        .with(file_layer)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
