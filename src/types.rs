// src/types.rs

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ItemError;

/// Identifier of one scan / work item, e.g. `"1052"`.
///
/// Files belonging to an item follow `<id>_<ROLE>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<id>_<role>.<ext>`
    pub fn file_name(&self, role: &str, ext: &str) -> String {
        format!("{}_{}.{}", self.0, role, ext)
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where fingerprints are kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// One sidecar file per tracked file (`.scanflow/<stage>/<name>.hash`).
    #[default]
    Sidecar,
    /// In-process only; every run starts with no records.
    Memory,
}

/// Final result of one attempted invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    TimedOut,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::TimedOut => "timed_out",
            Outcome::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Coarse error classification carried by failed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    MissingInput,
    MissingOutput,
    Invocation,
    TimedOut,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Io => "io",
            ErrorKind::MissingInput => "missing_input",
            ErrorKind::MissingOutput => "missing_output",
            ErrorKind::Invocation => "invocation",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One line of history: what happened to `item` in `step`, and when.
///
/// Created once an attempt ends and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub step: String,
    pub item: WorkItemId,
    pub outcome: Outcome,
    pub error: Option<ErrorKind>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn success(step: &str, item: &WorkItemId) -> Self {
        Self::new(step, item, Outcome::Success, None, None)
    }

    pub fn skipped(step: &str, item: &WorkItemId, detail: impl Into<String>) -> Self {
        Self::new(step, item, Outcome::Skipped, None, Some(detail.into()))
    }

    pub fn from_error(step: &str, item: &WorkItemId, err: &ItemError) -> Self {
        let kind = err.kind();
        let outcome = match kind {
            ErrorKind::TimedOut => Outcome::TimedOut,
            _ => Outcome::Failure,
        };
        Self::new(step, item, outcome, Some(kind), Some(err.to_string()))
    }

    fn new(
        step: &str,
        item: &WorkItemId,
        outcome: Outcome,
        error: Option<ErrorKind>,
        detail: Option<String>,
    ) -> Self {
        Self {
            step: step.to_string(),
            item: item.clone(),
            outcome,
            error,
            detail,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Single-line rendering used by the run log.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.step,
            self.item,
            self.outcome
        );
        if let Some(kind) = self.error {
            line.push(' ');
            line.push_str(&kind.to_string());
            if let Some(detail) = &self.detail {
                line.push_str(": ");
                line.push_str(&detail.replace('\n', " "));
            }
        }
        line
    }
}

/// Switches shared by stages and workflow steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Treat everything as stale.
    pub force: bool,
    /// Decide and print, never execute or mutate state.
    pub dry_run: bool,
    /// Print the decision for every stage item / workflow step.
    pub verbose: bool,
}
