// src/logging.rs

//! Logging setup for `scanflow` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided), applied to every target
//! 2. `SCANFLOW_LOG` environment variable, any `EnvFilter` directive
//!    (e.g. `"debug"` or `"scanflow::stage=trace,info"`)
//! 3. default to `info`
//!
//! Logs go to stderr; stdout is reserved for the dry-run / verbose plan.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "SCANFLOW_LOG";

/// Initialise global logging subscriber. Call once, from `main`.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(lvl)),
        None => match std::env::var(LOG_ENV_VAR) {
            Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive.trim())
                .with_context(|| format!("parsing {LOG_ENV_VAR} filter directive"))?,
            _ => EnvFilter::new("info"),
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
