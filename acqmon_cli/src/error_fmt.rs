//! Human-readable error descriptions and structured JSON error formatting.

use crate::run::SessionFailed;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use acqmon_core::error::{BuildError, MonitorError};

    // Typed matches first
    if let Some(sf) = err.downcast_ref::<SessionFailed>() {
        if sf.timed_out() {
            return format!(
                "What happened: The {} session stopped because a hardware read timed out.\nLikely causes: The device stopped answering or the simulated fault is set to \"timeout\".\nHow to fix: Check the device connection (or [simulation].fault/fail_at), then rerun.",
                sf.session
            );
        }
        return format!(
            "What happened: The {} session ended in ERROR ({}).\nLikely causes: A hardware read failed mid-acquisition.\nHow to fix: Check the device and the [simulation] section of the config; data acquired before the failure was printed above.",
            sf.session, sf.message
        );
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingDevice => {
                "What happened: No value source was provided to the monitor.\nLikely causes: The device failed to initialize or was not wired into the builder.\nHow to fix: Pass the device via with_device(...).".to_string()
            }
            BuildError::MissingModule => {
                "What happened: No buffered module was provided to the drain.\nLikely causes: The module failed to initialize or was not wired into the builder.\nHow to fix: Pass the module via with_module(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML or on the command line.\nHow to fix: Edit the config file or the override flags, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::Timeout => "What happened: The session worker did not answer in time.\nLikely causes: A hardware read is blocking the worker, or command_timeout_ms is too low.\nHow to fix: Check the device, or raise monitor/drain command_timeout_ms in the config.".to_string(),
            MonitorError::Disconnected => "What happened: The session worker thread is gone.\nLikely causes: The worker panicked.\nHow to fix: Re-run with --log-level=debug and report the log.".to_string(),
            MonitorError::Setup(msg) => format!(
                "What happened: The session could not start ({msg}).\nLikely causes: The worker thread or its timer could not be created.\nHow to fix: Check system thread limits and rerun."
            ),
            MonitorError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML or on the command line.\nHow to fix: Edit the config file or the override flags, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Check the path and rerun. Original: {msg}"
        );
    }

    if lower.starts_with("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nLikely causes: A typo, or a value of the wrong type.\nHow to fix: Fix the file and rerun. Original: {msg}"
        );
    }

    if lower.starts_with("monitor.")
        || lower.starts_with("drain.")
        || lower.starts_with("logging.")
        || lower.starts_with("simulation.")
    {
        return format!(
            "What happened: Configuration is invalid: {msg}.\nLikely causes: An out-of-range value in the TOML or an override flag.\nHow to fix: Edit the named key and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 for a session that ended in ERROR, 4 for timeouts, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use acqmon_core::error::MonitorError;
    if let Some(sf) = err.downcast_ref::<SessionFailed>() {
        return if sf.timed_out() { 4 } else { 3 };
    }
    if let Some(MonitorError::Timeout) = err.downcast_ref::<MonitorError>() {
        return 4;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use acqmon_core::error::MonitorError;
    use serde_json::json;

    if let Some(sf) = err.downcast_ref::<SessionFailed>() {
        let reason = if sf.timed_out() { "Timeout" } else { "SessionError" };
        return json!({
            "reason": reason,
            "details": { "session": sf.session, "last_error": sf.message },
            "message": humanize(err),
        })
        .to_string();
    }

    let reason = match err.downcast_ref::<MonitorError>() {
        Some(MonitorError::Timeout) => "Timeout",
        Some(MonitorError::Config(_)) => "Config",
        Some(MonitorError::Setup(_)) => "Setup",
        _ => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use acqmon_core::error::MonitorError;

    fn failed(message: String) -> eyre::Report {
        SessionFailed {
            session: "monitor",
            message,
        }
        .into()
    }

    #[test]
    fn session_failures_map_to_exit_codes() {
        assert_eq!(exit_code_for_error(&failed("hardware error: x".into())), 3);
        assert_eq!(
            exit_code_for_error(&failed(MonitorError::Timeout.to_string())),
            4
        );
        assert_eq!(
            exit_code_for_error(&eyre::Report::new(MonitorError::Timeout)),
            4
        );
        assert_eq!(exit_code_for_error(&eyre::eyre!("anything else")), 1);
    }

    #[test]
    fn validation_messages_are_explained() {
        let text = humanize(&eyre::eyre!("monitor.capacity must be >= 1"));
        assert!(text.starts_with("What happened: Configuration is invalid"));
        assert!(text.contains("monitor.capacity"));
    }

    #[test]
    fn json_error_carries_reason_and_details() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&failed("hardware error: x".into())))
                .unwrap();
        assert_eq!(v["reason"], "SessionError");
        assert_eq!(v["details"]["session"], "monitor");
        assert!(v["message"].as_str().unwrap().contains("ended in ERROR"));
    }
}
