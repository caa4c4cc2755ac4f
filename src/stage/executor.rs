// src/stage/executor.rs

//! Batch processing of a change set.
//!
//! Items run on a bounded pool of tokio tasks. Every item error stops at
//! the item boundary: it becomes an [`ExecutionRecord`], lands in the
//! failure log, and the batch moves on. Fingerprints (inputs plus the tool
//! build) are committed after the batch, sequentially, and only for items
//! that succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::detect::ChangeSet;
use crate::errors::{ItemError, Result};
use crate::exec::{invoke_with_deadline, Invoker};
use crate::fingerprint::FingerprintStore;
use crate::stage::gear::{Action, Gear};
use crate::stage::log::BatchLog;
use crate::types::{ExecutionRecord, Outcome, WorkItemId};

/// What happened to one stage batch.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub stage: String,
    /// One record per item of the change set, ordered by item ID.
    pub records: Vec<ExecutionRecord>,
}

impl StageReport {
    pub fn empty(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            records: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(ExecutionRecord::succeeded)
    }

    pub fn succeeded_ids(&self) -> Vec<&WorkItemId> {
        self.ids_where(|r| r.succeeded())
    }

    pub fn failed_ids(&self) -> Vec<&WorkItemId> {
        self.ids_where(|r| !r.succeeded())
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    fn ids_where(&self, pred: impl Fn(&ExecutionRecord) -> bool) -> Vec<&WorkItemId> {
        self.records
            .iter()
            .filter(|r| pred(r))
            .map(|r| &r.item)
            .collect()
    }
}

/// Runs a gear over the items of a change set.
pub struct StageExecutor {
    gear: Arc<dyn Gear>,
    invoker: Arc<dyn Invoker>,
    log_dir: PathBuf,
    timeout: Option<Duration>,
    jobs: usize,
    cancel: CancellationToken,
}

impl StageExecutor {
    pub fn new(gear: Arc<dyn Gear>, invoker: Arc<dyn Invoker>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            gear,
            invoker,
            log_dir: log_dir.into(),
            timeout: None,
            jobs: 1,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Worker pool size; values below 1 are treated as 1.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn gear(&self) -> &dyn Gear {
        self.gear.as_ref()
    }

    pub fn name(&self) -> &str {
        self.gear.name()
    }

    /// Process every item of `change_set`.
    ///
    /// An empty change set is a no-op: no logs are touched and nothing is
    /// invoked. The `Err` case is reserved for problems with the batch
    /// itself (the log directory cannot be written).
    pub async fn filter(
        &self,
        change_set: &ChangeSet,
        store: &mut dyn FingerprintStore,
    ) -> Result<StageReport> {
        let stage = self.gear.name().to_string();
        if change_set.is_empty() {
            debug!(stage = %stage, "change set empty; nothing to do");
            return Ok(StageReport::empty(stage));
        }

        let log = Arc::new(BatchLog::open(&self.log_dir, &stage)?);
        let pool = Arc::new(Semaphore::new(self.jobs));
        info!(stage = %stage, items = change_set.len(), jobs = self.jobs, "processing change set");

        let mut handles: Vec<(WorkItemId, JoinHandle<ExecutionRecord>)> = Vec::new();
        for id in change_set.ids() {
            let task = ItemTask {
                stage: stage.clone(),
                id: id.clone(),
                gear: Arc::clone(&self.gear),
                invoker: Arc::clone(&self.invoker),
                timeout: self.timeout,
                cancel: self.cancel.clone(),
            };
            let pool = Arc::clone(&pool);
            let log = Arc::clone(&log);
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquiring can't fail.
                let _permit = pool.acquire_owned().await.ok();
                let record = task.run().await;
                log.record(&record);
                if !record.succeeded() {
                    log.failure(record.item.as_str());
                }
                record
            });
            handles.push((id.clone(), handle));
        }

        let mut records = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let record = match handle.await {
                Ok(record) => record,
                Err(join_err) => {
                    error!(stage = %stage, item = %id, error = %join_err, "item task panicked");
                    let record = ExecutionRecord {
                        detail: Some(format!("worker panicked: {join_err}")),
                        ..ExecutionRecord::from_error(&stage, &id, &ItemError::Cancelled)
                    };
                    log.record(&record);
                    log.failure(id.as_str());
                    record
                }
            };
            records.push(record);
        }

        let report = StageReport { stage, records };
        commit_fingerprints(&report, change_set, store);

        info!(
            stage = %report.stage,
            succeeded = report.count(Outcome::Success),
            failed = report.count(Outcome::Failure),
            timed_out = report.count(Outcome::TimedOut),
            skipped = report.count(Outcome::Skipped),
            "stage finished"
        );
        Ok(report)
    }
}

/// Owned state for one spawned item.
struct ItemTask {
    stage: String,
    id: WorkItemId,
    gear: Arc<dyn Gear>,
    invoker: Arc<dyn Invoker>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ItemTask {
    async fn run(self) -> ExecutionRecord {
        if self.cancel.is_cancelled() {
            return ExecutionRecord::skipped(&self.stage, &self.id, "cancelled before start");
        }

        let result = match self.gear.derive_arguments(&self.id) {
            Ok(args) => {
                perform_actions(&args.actions, self.invoker.as_ref(), self.timeout, &self.cancel).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(stage = %self.stage, item = %self.id, "item succeeded");
                ExecutionRecord::success(&self.stage, &self.id)
            }
            Err(e) => {
                warn!(stage = %self.stage, item = %self.id, error = %e, "item failed");
                ExecutionRecord::from_error(&self.stage, &self.id, &e)
            }
        }
    }
}

/// Run `actions` in order, stopping at the first failure.
///
/// Output directories are created up front; after each action every file
/// it declares must exist.
pub async fn perform_actions(
    actions: &[Action],
    invoker: &dyn Invoker,
    limit: Option<Duration>,
    cancel: &CancellationToken,
) -> std::result::Result<(), ItemError> {
    for action in actions {
        for output in action.produces() {
            ensure_parent(output).await?;
        }

        match action {
            Action::Run(invocation) => {
                invoke_with_deadline(invoker, invocation, limit, cancel).await?;
            }
            Action::Copy { from, to } => {
                debug!(from = ?from, to = ?to, "copying");
                tokio::fs::copy(from, to)
                    .await
                    .map_err(|e| ItemError::io(from, e))?;
            }
        }

        if let Some(missing) = action.produces().into_iter().find(|p| !p.exists()) {
            return Err(ItemError::MissingOutput(missing.to_path_buf()));
        }
    }
    Ok(())
}

async fn ensure_parent(path: &Path) -> std::result::Result<(), ItemError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ItemError::io(parent, e)),
        _ => Ok(()),
    }
}

fn commit_fingerprints(report: &StageReport, change_set: &ChangeSet, store: &mut dyn FingerprintStore) {
    for record in report.records.iter().filter(|r| r.succeeded()) {
        for file in change_set.files_for(&record.item) {
            if let Err(e) = store.record(&file.path, &file.hash) {
                warn!(path = ?file.path, error = %e, "failed to record fingerprint; file stays dirty");
            }
        }
        for exe in change_set.executables() {
            if let Err(e) = store.record_tool(&record.item, &exe.path, &exe.hash) {
                warn!(item = %record.item, executable = ?exe.path, error = %e, "failed to record executable fingerprint");
            }
        }
    }
}
