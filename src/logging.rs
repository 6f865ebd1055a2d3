// src/logging.rs

//! Subscriber setup for the `stageflow` binary.
//!
//! `--log-level` wins and applies to every target. Without it,
//! `STAGEFLOW_LOG` is read as an `EnvFilter` directive, so executor tracing
//! can be turned up on its own:
//!
//! ```text
//! STAGEFLOW_LOG=info,stageflow::exec=trace stageflow --frames 3
//! ```
//!
//! Anything unparsable falls back to `info`. Output goes to stderr so the
//! dry-run listing on stdout stays clean.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "STAGEFLOW_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, directive.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

/// Filter from the CLI level, else the directive, else `info`.
pub fn build_filter(cli_level: Option<LogLevel>, directive: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_name(level));
    }
    directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
