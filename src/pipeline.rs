// src/pipeline.rs

//! A stage paired with its change detection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConfigFile, StageConfig};
use crate::detect::{ChangeSet, ChangeSetDetector, TrackedLocation};
use crate::errors::Result;
use crate::exec::Invoker;
use crate::fingerprint::{store_for_mode, FingerprintStore};
use crate::stage::{StageExecutor, StageGear, StageReport};
use crate::types::RunOptions;

/// Detector + executor + the store both of them read and write.
///
/// Holds no state of its own between runs; everything durable lives in the
/// fingerprint store.
pub struct PipelineStep {
    detector: ChangeSetDetector,
    executor: StageExecutor,
    store: Box<dyn FingerprintStore>,
}

impl PipelineStep {
    pub fn new(
        detector: ChangeSetDetector,
        executor: StageExecutor,
        store: Box<dyn FingerprintStore>,
    ) -> Self {
        Self {
            detector,
            executor,
            store,
        }
    }

    /// Wire up a `[[stage]]` entry: tracked locations and executable for
    /// the detector, a [`StageGear`] for the executor, and the configured
    /// fingerprint store namespaced by stage name (tool records under
    /// `state_dir`).
    pub fn from_config(
        cfg: &ConfigFile,
        stage: &StageConfig,
        invoker: Arc<dyn Invoker>,
        jobs: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let locations = stage
            .track
            .iter()
            .map(|t| TrackedLocation::from_config(t, |p| cfg.resolve(p)))
            .collect::<Result<Vec<_>>>()?;
        let detector = ChangeSetDetector::new(locations, cfg.id_convention().clone())
            .with_executable(cfg.resolve_program(&stage.executable));

        let gear = Arc::new(StageGear::from_config(stage, cfg));
        let executor = StageExecutor::new(gear, invoker, cfg.log_dir())
            .with_timeout(cfg.timeout_for(stage.timeout.as_deref()))
            .with_jobs(jobs)
            .with_cancel(cancel);

        let store = store_for_mode(
            cfg.config.hash_storage,
            &stage.name,
            cfg.executable_records_dir(),
        );
        Ok(Self::new(detector, executor, store))
    }

    pub fn name(&self) -> &str {
        self.executor.name()
    }

    /// Compute the change set without running anything.
    pub fn plan(&self, force: bool) -> Result<ChangeSet> {
        self.detector
            .detect(self.store.as_ref(), Some(self.executor.gear()), force)
    }

    /// Detect, then process the stale items. The stage is only invoked for
    /// a non-empty change set; in dry-run mode it is never invoked.
    pub async fn run(&mut self, options: RunOptions) -> Result<StageReport> {
        let change_set = self.plan(options.force)?;
        let name = self.name().to_string();

        if options.dry_run || options.verbose {
            print_plan(&name, &change_set, options.dry_run);
        }

        if options.dry_run {
            return Ok(StageReport::empty(name));
        }
        if change_set.is_empty() {
            info!(stage = %name, "up to date");
            return Ok(StageReport::empty(name));
        }

        self.executor
            .filter(&change_set, self.store.as_mut())
            .await
    }
}

fn print_plan(stage: &str, change_set: &ChangeSet, dry_run: bool) {
    let verb = if dry_run { "would process" } else { "processing" };
    if change_set.is_empty() {
        println!("[{stage}] up to date");
        return;
    }
    for id in change_set.ids() {
        println!("[{stage}] {verb} {id}");
    }
}
