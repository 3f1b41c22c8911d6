// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pitrix`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pitrix",
    version,
    about = "Build the task plan of a cluster lifecycle job.",
    long_about = None
)]
pub struct CliArgs {
    /// Job record (JSON) whose directive holds the cluster document.
    #[arg(long, value_name = "PATH")]
    pub job: PathBuf,

    /// Runtime record (JSON) the job targets.
    #[arg(long, value_name = "PATH")]
    pub runtime: PathBuf,

    /// Planner config (TOML).
    ///
    /// Default: `Pitrix.toml` in the current directory if present, otherwise
    /// built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// How to print the plan.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PITRIX_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
