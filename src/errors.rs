// src/errors.rs

//! Crate-wide error types.
//!
//! Two families:
//! - [`ScanflowError`]: configuration-level problems. These are fatal and
//!   abort a run before any work item is touched.
//! - [`ItemError`]: everything that can go wrong while processing a single
//!   work item or workflow step. These are caught at the item boundary,
//!   recorded, and the batch moves on.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ErrorKind;

#[derive(Error, Debug)]
pub enum ScanflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected between workflow steps: {0}")]
    DagCycle(String),

    #[error("Cache error at {path:?}: {reason}")]
    CacheError { path: PathBuf, reason: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScanflowError>;

/// Failure of a single work item (or workflow step).
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required input missing: {0:?}")]
    MissingInput(PathBuf),

    #[error("expected output not produced: {0:?}")]
    MissingOutput(PathBuf),

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program:?} exited with status {code}")]
    ExitStatus { program: PathBuf, code: i32 },

    #[error("deadline of {0:?} exceeded")]
    TimedOut(std::time::Duration),

    #[error("cancelled")]
    Cancelled,
}

impl ItemError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ItemError::Io {
            path: path.into(),
            source,
        }
    }

    /// Coarse classification used in execution records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Io { .. } => ErrorKind::Io,
            ItemError::MissingInput(_) => ErrorKind::MissingInput,
            ItemError::MissingOutput(_) => ErrorKind::MissingOutput,
            ItemError::Spawn { .. } | ItemError::ExitStatus { .. } => ErrorKind::Invocation,
            ItemError::TimedOut(_) => ErrorKind::TimedOut,
            ItemError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
