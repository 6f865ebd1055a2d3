// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `stageflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stageflow",
    version,
    about = "Run the staged-pipeline demo scene frame by frame.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Stageflow.toml` is used when it exists, defaults otherwise.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Number of frames to run (overrides `[app].frames`).
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Frame at which the render consumer attaches (overrides `[app].attach_at`).
    #[arg(long, value_name = "N")]
    pub attach_at: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STAGEFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Build the scene, print pipelines and the static task order, exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = CliArgs::parse_from([
            "stageflow",
            "--frames",
            "3",
            "--attach-at",
            "1",
            "--log-level",
            "debug",
            "--dry-run",
        ]);
        assert_eq!(args.frames, Some(3));
        assert_eq!(args.attach_at, Some(1));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
        assert!(args.config.is_none());
    }
}
