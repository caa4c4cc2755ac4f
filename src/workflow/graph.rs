// src/workflow/graph.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{ItemError, Result};
use crate::exec::Invoker;
use crate::fingerprint::compute_path_hash;
use crate::stage::{perform_actions, Action, DeferredLog};
use crate::types::{ExecutionRecord, RunOptions, WorkItemId};
use crate::workflow::cache::{CachedInput, WorkflowCache};
use crate::workflow::step::StepDefinition;
use crate::workflow::template::expand_path;

/// Lifecycle of a step within one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    NotRun,
    /// Up to date; skipped.
    Cached,
    /// Decided to execute.
    Stale,
    Executing,
    Done,
    Failed,
}

/// Why a step has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Forced,
    NoCacheEntry,
    InputChanged(PathBuf),
    InputNotCached(PathBuf),
    InputUnreadable(PathBuf),
    OutputMissing(PathBuf),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Forced => write!(f, "forced"),
            StaleReason::NoCacheEntry => write!(f, "never ran"),
            StaleReason::InputChanged(p) => write!(f, "input changed: {}", p.display()),
            StaleReason::InputNotCached(p) => write!(f, "new input: {}", p.display()),
            StaleReason::InputUnreadable(p) => write!(f, "input unreadable: {}", p.display()),
            StaleReason::OutputMissing(p) => write!(f, "output missing: {}", p.display()),
        }
    }
}

/// Result of running the graph for one item.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub item: WorkItemId,
    /// Final state per step, in declaration order.
    pub states: Vec<(String, StepState)>,
    /// One record per attempted (or cancelled) step.
    pub records: Vec<ExecutionRecord>,
}

impl WorkflowReport {
    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(ExecutionRecord::succeeded)
    }

    pub fn state(&self, step: &str) -> Option<StepState> {
        self.states
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, state)| *state)
    }

    pub fn executed(&self) -> usize {
        self.records.len()
    }
}

/// The ordered steps of one work item plus its cache.
///
/// Steps execute strictly in declaration order; a failure does not stop
/// the steps after it.
pub struct WorkflowGraph {
    item: WorkItemId,
    steps: Vec<StepDefinition>,
    required: Vec<PathBuf>,
    cache: WorkflowCache,
    invoker: Arc<dyn Invoker>,
    cancel: CancellationToken,
    log: Option<Arc<DeferredLog>>,
}

impl WorkflowGraph {
    pub fn new(item: WorkItemId, cache: WorkflowCache, invoker: Arc<dyn Invoker>) -> Self {
        Self {
            item,
            steps: Vec::new(),
            required: Vec::new(),
            cache,
            invoker,
            cancel: CancellationToken::new(),
            log: None,
        }
    }

    /// Instantiate every `[[workflow.step]]` for `item` and load its cache.
    pub fn from_config(cfg: &ConfigFile, item: WorkItemId, invoker: Arc<dyn Invoker>) -> Result<Self> {
        let cache = WorkflowCache::load(cfg.workflow_cache_path(item.as_str()))?;
        let mut graph = Self::new(item, cache, invoker);
        for template in &cfg.workflow.step {
            let step = StepDefinition::instantiate(template, &graph.item, cfg)?;
            graph.add_step(step);
        }
        for required in &cfg.workflow.required {
            graph
                .required
                .push(cfg.resolve(expand_path(required, graph.item.as_str())));
        }
        Ok(graph)
    }

    pub fn add_step(&mut self, step: StepDefinition) {
        self.steps.push(step);
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_log(mut self, log: Arc<DeferredLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn cache(&self) -> &WorkflowCache {
        &self.cache
    }

    /// Remove every cache entry and persist the empty cache.
    pub fn clear_cache(&mut self) -> Result<()> {
        info!(item = %self.item, cache = ?self.cache.path(), "clearing workflow cache");
        self.cache.clear()
    }

    /// `None` when the step is up to date.
    pub fn stale_reason(&self, step: &StepDefinition, force: bool) -> Option<StaleReason> {
        if force {
            return Some(StaleReason::Forced);
        }
        let Some(entry) = self.cache.get(&step.name) else {
            return Some(StaleReason::NoCacheEntry);
        };

        for input in &step.inputs {
            let Some(cached) = entry.iter().find(|c| &c.path == input) else {
                return Some(StaleReason::InputNotCached(input.clone()));
            };
            match compute_path_hash(input) {
                Ok(hash) if hash == cached.hash => {}
                Ok(_) => return Some(StaleReason::InputChanged(input.clone())),
                Err(_) => return Some(StaleReason::InputUnreadable(input.clone())),
            }
        }

        step.outputs
            .iter()
            .find(|p| !p.exists())
            .map(|p| StaleReason::OutputMissing(p.clone()))
    }

    /// Run (or, with `dry_run`, plan) every step.
    pub async fn execute(&mut self, options: RunOptions) -> Result<WorkflowReport> {
        let mut report = WorkflowReport {
            item: self.item.clone(),
            states: self
                .steps
                .iter()
                .map(|s| (s.name.clone(), StepState::NotRun))
                .collect(),
            records: Vec::new(),
        };

        if options.force && !options.dry_run {
            self.clear_cache()?;
        }

        if let Some(missing) = self.required.iter().find(|p| !p.exists()) {
            warn!(item = %self.item, file = ?missing, "required file missing; item not executed");
            if options.dry_run {
                println!("[{}] required file missing: {}", self.item, missing.display());
                return Ok(report);
            }
            let err = ItemError::MissingInput(missing.clone());
            for (idx, step) in self.steps.iter().enumerate() {
                report.states[idx].1 = StepState::Failed;
                let record = ExecutionRecord::from_error(&step.name, &self.item, &err);
                self.log_record(&record);
                report.records.push(record);
            }
            return Ok(report);
        }

        for idx in 0..self.steps.len() {
            let step = self.steps[idx].clone();

            let Some(reason) = self.stale_reason(&step, options.force) else {
                report.states[idx].1 = StepState::Cached;
                debug!(item = %self.item, step = %step.name, "up to date");
                if options.dry_run || options.verbose {
                    println!("[{}] {}: skipped, up to date", self.item, step.name);
                }
                continue;
            };

            report.states[idx].1 = StepState::Stale;
            if options.dry_run {
                println!("[{}] {}: would execute ({reason})", self.item, step.name);
                continue;
            }
            if options.verbose {
                println!("[{}] {}: executing ({reason})", self.item, step.name);
            }

            if self.cancel.is_cancelled() {
                report.states[idx].1 = StepState::NotRun;
                let record = ExecutionRecord::skipped(&step.name, &self.item, "cancelled before start");
                self.log_record(&record);
                report.records.push(record);
                continue;
            }

            report.states[idx].1 = StepState::Executing;
            info!(item = %self.item, step = %step.name, %reason, "executing step");
            let record = match self.run_step(&step).await {
                Ok(()) => {
                    report.states[idx].1 = StepState::Done;
                    ExecutionRecord::success(&step.name, &self.item)
                }
                Err(e) => {
                    warn!(item = %self.item, step = %step.name, error = %e, "step failed");
                    report.states[idx].1 = StepState::Failed;
                    ExecutionRecord::from_error(&step.name, &self.item, &e)
                }
            };
            self.log_record(&record);
            report.records.push(record);
        }

        Ok(report)
    }

    async fn run_step(&mut self, step: &StepDefinition) -> std::result::Result<(), ItemError> {
        // Inputs may be files or whole directories.
        if let Some(missing) = step.inputs.iter().find(|p| !p.is_file() && !p.is_dir()) {
            return Err(ItemError::MissingInput(missing.clone()));
        }

        let actions = [Action::Run(step.invocation())];
        perform_actions(&actions, self.invoker.as_ref(), step.timeout, &self.cancel).await?;

        let mut fingerprints = Vec::with_capacity(step.inputs.len());
        for input in &step.inputs {
            let hash = compute_path_hash(input).map_err(|e| ItemError::io(input, e))?;
            fingerprints.push(CachedInput {
                path: input.clone(),
                hash,
            });
        }
        self.cache.put(step.name.clone(), fingerprints);
        if let Err(e) = self.cache.save() {
            warn!(item = %self.item, error = %e, "failed to persist workflow cache; step will rerun");
        }
        Ok(())
    }

    fn log_record(&self, record: &ExecutionRecord) {
        if let Some(log) = &self.log {
            log.record(record);
            if !record.succeeded() {
                log.failure(&format!("{} {}", record.item, record.step));
            }
        }
    }
}
