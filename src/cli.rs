// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::FailurePolicy;

/// Command-line arguments for `rundag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rundag",
    version,
    about = "Apply a set of dependent units of work to each target, running independent units concurrently.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Rundag.toml")]
    pub config: String,

    /// Let units make changes. Without this flag units run in read-only mode.
    #[arg(long)]
    pub apply: bool,

    /// Only process these targets (repeatable). Targets not present in the
    /// config are processed with no vars.
    #[arg(long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Case-insensitive regex target names must match (overrides `[config].filter`).
    #[arg(long, value_name = "REGEX")]
    pub filter: Option<String>,

    /// Also process targets marked `fork = true`.
    #[arg(long)]
    pub include_forks: bool,

    /// Whether a failed unit still unblocks its dependents
    /// (overrides `[config].failure_policy`).
    #[arg(long, value_name = "POLICY")]
    pub failure_policy: Option<FailurePolicy>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't execute any units.
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
