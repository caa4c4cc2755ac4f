// src/stage/log.rs

//! Plain-text logs written next to a batch.
//!
//! - `<name>.failures`: one line per failed item, truncated when the batch
//!   starts.
//! - `<name>.log`: one line per [`ExecutionRecord`], appended across runs.
//!
//! [`DeferredLog`] opens (and so truncates) on the first write only.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::warn;

use crate::types::ExecutionRecord;

#[derive(Debug)]
pub struct BatchLog {
    failures: Mutex<File>,
    records: Mutex<File>,
}

impl BatchLog {
    /// Create `log_dir` if needed, truncate the failure log and open the
    /// run log for appending.
    pub fn open(log_dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let failures = File::create(log_dir.join(format!("{name}.failures")))?;
        let records = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(format!("{name}.log")))?;
        Ok(Self {
            failures: Mutex::new(failures),
            records: Mutex::new(records),
        })
    }

    /// Append `record` to the run log. Write errors are logged, not
    /// propagated: losing a log line must not fail the item.
    pub fn record(&self, record: &ExecutionRecord) {
        append_line(&self.records, &record.to_log_line());
    }

    /// Append one entry to the failure log.
    pub fn failure(&self, entry: &str) {
        append_line(&self.failures, entry);
    }
}

/// A [`BatchLog`] that is only opened once something is written to it.
///
/// A run in which every step is up to date leaves the previous failure log
/// untouched. If the log can't be opened, the error is logged once and
/// later writes are dropped.
#[derive(Debug)]
pub struct DeferredLog {
    log_dir: PathBuf,
    name: String,
    log: OnceLock<Option<BatchLog>>,
}

impl DeferredLog {
    pub fn new(log_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            name: name.into(),
            log: OnceLock::new(),
        }
    }

    pub fn record(&self, record: &ExecutionRecord) {
        if let Some(log) = self.get() {
            log.record(record);
        }
    }

    pub fn failure(&self, entry: &str) {
        if let Some(log) = self.get() {
            log.failure(entry);
        }
    }

    fn get(&self) -> Option<&BatchLog> {
        self.log
            .get_or_init(|| match BatchLog::open(&self.log_dir, &self.name) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(dir = ?self.log_dir, log = %self.name, error = %e, "cannot open log; entries dropped");
                    None
                }
            })
            .as_ref()
    }
}

fn append_line(file: &Mutex<File>, line: &str) {
    let mut guard = match file.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = writeln!(guard, "{line}").and_then(|_| guard.flush()) {
        warn!(error = %e, "failed to write log line");
    }
}
