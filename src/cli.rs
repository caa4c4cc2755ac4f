// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scanflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scanflow",
    version,
    about = "Incrementally run scan-processing stages and workflow steps.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Scanflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Scanflow.toml")]
    pub config: String,

    /// Ignore recorded fingerprints and cache entries; treat everything as stale.
    #[arg(long)]
    pub force_execute: bool,

    /// Decide what is stale and print the plan, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the skip/execute decision for every step.
    #[arg(long)]
    pub verbose: bool,

    /// Remove all workflow cache entries and exit.
    #[arg(long)]
    pub clear_cache: bool,

    /// Run only the named stage (the workflow is skipped).
    #[arg(long, value_name = "NAME")]
    pub stage: Option<String>,

    /// Restrict the workflow to these work items. Repeatable.
    #[arg(long = "item", value_name = "ID")]
    pub items: Vec<String>,

    /// Override `[config].jobs`.
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCANFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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
