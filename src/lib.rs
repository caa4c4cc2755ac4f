// src/lib.rs

pub mod cli;
pub mod config;
pub mod detect;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod logging;
pub mod pipeline;
pub mod stage;
pub mod types;
pub mod workflow;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::errors::ScanflowError;
use crate::exec::{Invoker, ProcessInvoker};
use crate::pipeline::PipelineStep;
use crate::stage::{DeferredLog, StageReport};
use crate::types::{RunOptions, WorkItemId};
use crate::workflow::{discover_items, WorkflowCache, WorkflowGraph, WorkflowReport};

/// What to run, independent of where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub options: RunOptions,
    /// Only this stage; the workflow is skipped.
    pub stage: Option<String>,
    /// Workflow items to run instead of `[workflow].items`.
    pub items: Vec<String>,
    /// Overrides `[config].jobs`.
    pub jobs: Option<usize>,
}

impl RunPlan {
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            options: RunOptions {
                force: args.force_execute,
                dry_run: args.dry_run,
                verbose: args.verbose,
            },
            stage: args.stage.clone(),
            items: args.items.clone(),
            jobs: args.jobs,
        }
    }
}

/// Everything that ran.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub workflows: Vec<WorkflowReport>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.stages.iter().all(StageReport::all_succeeded)
            && self.workflows.iter().all(WorkflowReport::all_succeeded)
    }
}

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, installs the Ctrl-C handler, then runs
/// stages and workflow items with the real process backend.
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let cfg = load_and_validate(&args.config)?;
    let plan = RunPlan::from_args(&args);

    if args.clear_cache {
        clear_workflow_caches(&cfg, &plan)?;
        return Ok(RunSummary::default());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; finishing running items, skipping the rest");
            cancel.cancel();
        });
    }

    let invoker: Arc<dyn Invoker> = Arc::new(ProcessInvoker);
    Ok(run_config(&cfg, &plan, invoker, cancel).await?)
}

/// Run stages (in declaration order), then workflow items, against an
/// already validated config.
pub async fn run_config(
    cfg: &ConfigFile,
    plan: &RunPlan,
    invoker: Arc<dyn Invoker>,
    cancel: CancellationToken,
) -> errors::Result<RunSummary> {
    let jobs = plan.jobs.unwrap_or(cfg.config.jobs);
    if jobs == 0 {
        return Err(ScanflowError::ConfigError("--jobs must be at least 1".into()));
    }

    let stages = match &plan.stage {
        Some(name) => vec![cfg.find_stage(name).ok_or_else(|| {
            ScanflowError::ConfigError(format!("no stage named '{name}' in config"))
        })?],
        None => cfg.stage.iter().collect(),
    };

    let mut summary = RunSummary::default();
    for stage in stages {
        if cancel.is_cancelled() {
            warn!(stage = %stage.name, "cancelled; stage not started");
            break;
        }
        let mut step =
            PipelineStep::from_config(cfg, stage, Arc::clone(&invoker), jobs, cancel.clone())?;
        let report = step.run(plan.options).await?;
        summary.stages.push(report);
    }

    if plan.stage.is_some() || cfg.workflow.step.is_empty() {
        return Ok(summary);
    }
    let items = workflow_items(cfg, plan)?;
    if items.is_empty() {
        return Ok(summary);
    }

    // Opened by the first step that actually runs.
    let log = (!plan.options.dry_run).then(|| Arc::new(DeferredLog::new(cfg.log_dir(), "workflow")));

    for item in items {
        let mut graph = WorkflowGraph::from_config(cfg, item, Arc::clone(&invoker))?
            .with_cancel(cancel.clone());
        if let Some(log) = &log {
            graph = graph.with_log(Arc::clone(log));
        }
        let report = graph.execute(plan.options).await?;
        summary.workflows.push(report);
    }

    info!(
        stages = summary.stages.len(),
        workflow_items = summary.workflows.len(),
        ok = summary.all_succeeded(),
        "run finished"
    );
    Ok(summary)
}

/// `--clear-cache`: reset the workflow cache of every selected item.
///
/// Existing files are overwritten without being parsed, so a corrupt cache
/// can be cleared too.
pub fn clear_workflow_caches(cfg: &ConfigFile, plan: &RunPlan) -> errors::Result<()> {
    for item in workflow_items(cfg, plan)? {
        let mut cache = WorkflowCache::empty(cfg.workflow_cache_path(item.as_str()));
        cache.clear()?;
        info!(item = %item, cache = ?cache.path(), "workflow cache cleared");
    }
    Ok(())
}

/// `--item` wins; otherwise `[workflow].items` followed by whatever
/// `[workflow].item_glob` discovers.
fn workflow_items(cfg: &ConfigFile, plan: &RunPlan) -> errors::Result<Vec<WorkItemId>> {
    if !plan.items.is_empty() {
        return Ok(plan.items.iter().map(|s| WorkItemId::new(s.as_str())).collect());
    }

    let mut items: Vec<WorkItemId> = cfg
        .workflow
        .items
        .iter()
        .map(|s| WorkItemId::new(s.as_str()))
        .collect();
    if let Some(pattern) = &cfg.workflow.item_glob {
        for id in discover_items(cfg.root(), pattern)? {
            if !items.contains(&id) {
                items.push(id);
            }
        }
    }
    Ok(items)
}
