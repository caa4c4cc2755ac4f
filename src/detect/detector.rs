// src/detect/detector.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::config::model::TrackConfig;
use crate::detect::change_set::{ChangeSet, TrackedFile};
use crate::detect::naming::IdConvention;
use crate::errors::{Result, ScanflowError};
use crate::fingerprint::FingerprintStore;
use crate::stage::Gear;
use crate::types::WorkItemId;

/// One tracked directory plus an optional file-name filter.
#[derive(Debug, Clone)]
pub struct TrackedLocation {
    dir: PathBuf,
    include: Option<GlobSet>,
}

impl TrackedLocation {
    /// Track every (non-hidden) file directly under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            include: None,
        }
    }

    /// Track only file names matching one of `patterns`.
    pub fn with_include(dir: impl Into<PathBuf>, patterns: &[String]) -> Result<Self> {
        let mut location = Self::new(dir);
        if !patterns.is_empty() {
            let mut builder = GlobSetBuilder::new();
            for p in patterns {
                let glob = Glob::new(p)
                    .with_context(|| format!("compiling include pattern '{p}'"))?;
                builder.add(glob);
            }
            location.include = Some(
                builder
                    .build()
                    .context("building include pattern set")?,
            );
        }
        Ok(location)
    }

    /// Build from a `[[stage]].track` entry, resolving `dir` with `resolve`.
    pub fn from_config(track: &TrackConfig, resolve: impl Fn(&Path) -> PathBuf) -> Result<Self> {
        Self::with_include(resolve(&track.dir), &track.include)
    }

    fn accepts(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') {
            return false;
        }
        match &self.include {
            Some(set) => set.is_match(file_name),
            None => true,
        }
    }

    /// Regular, accepted files directly under the directory, sorted.
    fn files(&self) -> Result<Vec<(String, PathBuf)>> {
        if !self.dir.is_dir() {
            return Err(ScanflowError::ConfigError(format!(
                "tracked directory {:?} does not exist",
                self.dir
            )));
        }

        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.accepts(name) {
                out.push((name.to_string(), path.clone()));
            }
        }
        out.sort();
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct ItemScan {
    files: Vec<TrackedFile>,
    dirty: bool,
}

/// Works out which items of a stage need (re)processing.
#[derive(Debug, Clone)]
pub struct ChangeSetDetector {
    locations: Vec<TrackedLocation>,
    executables: Vec<PathBuf>,
    convention: IdConvention,
}

impl ChangeSetDetector {
    pub fn new(locations: Vec<TrackedLocation>, convention: IdConvention) -> Self {
        Self {
            locations,
            executables: Vec::new(),
            convention,
        }
    }

    /// Track an external tool: when its fingerprint changes, every item is
    /// stale until it succeeds with the new build.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executables.push(executable.into());
        self.executables.sort();
        self.executables.dedup();
        self
    }

    /// Compute the change set.
    ///
    /// An item is stale when any of its tracked files is dirty, when a
    /// tracked executable differs from the build the item last succeeded
    /// with, when `gear` reports an expected output that doesn't exist, or
    /// when `force` is set.
    pub fn detect(
        &self,
        store: &dyn FingerprintStore,
        gear: Option<&dyn Gear>,
        force: bool,
    ) -> Result<ChangeSet> {
        let mut items: BTreeMap<WorkItemId, ItemScan> = BTreeMap::new();

        for location in &self.locations {
            for (name, path) in location.files()? {
                let Some(id) = self.convention.item_id(&name) else {
                    debug!(file = %name, "file name has no work-item ID; ignoring");
                    continue;
                };
                let scan = items.entry(id).or_default();

                match store.hash(&path) {
                    Ok(hash) => {
                        let recorded = store.recorded(&path).unwrap_or_else(|e| {
                            warn!(path = ?path, error = %e, "unreadable fingerprint record; treating as dirty");
                            None
                        });
                        if recorded.as_deref() != Some(hash.as_str()) {
                            debug!(path = ?path, "dirty");
                            scan.dirty = true;
                        }
                        scan.files.push(TrackedFile { path, hash });
                    }
                    Err(e) => {
                        warn!(path = ?path, error = %e, "cannot hash tracked file; item stays stale");
                        scan.dirty = true;
                    }
                }
            }
        }

        let executables = self.current_executables(store);

        let mut change_set = ChangeSet::new();
        let mut tool_stale = 0usize;
        for (id, scan) in items {
            let tool_changed = executables.iter().any(|exe| {
                let recorded = store.recorded_tool(&id, &exe.path).unwrap_or_else(|e| {
                    warn!(item = %id, executable = ?exe.path, error = %e, "unreadable tool record; treating as changed");
                    None
                });
                recorded.as_deref() != Some(exe.hash.as_str())
            });
            if tool_changed {
                debug!(item = %id, "executable changed since the item last succeeded");
                tool_stale += 1;
            }

            let missing_output = gear.and_then(|g| {
                g.expected_outputs(&id).into_iter().find(|p| !p.exists())
            });
            if let Some(missing) = &missing_output {
                debug!(item = %id, output = ?missing, "expected output missing");
            }

            if force || tool_changed || scan.dirty || missing_output.is_some() {
                change_set.insert(id, scan.files);
            }
        }
        if tool_stale > 0 {
            info!(items = tool_stale, "items not yet processed with the current executable");
        }
        change_set.set_executables(executables);

        debug!(stale = change_set.len(), "change detection finished");
        Ok(change_set)
    }

    fn current_executables(&self, store: &dyn FingerprintStore) -> Vec<TrackedFile> {
        let mut current = Vec::new();
        for exe in &self.executables {
            if !exe.is_file() {
                debug!(executable = ?exe, "executable is not a local file; not fingerprinted");
                continue;
            }
            match store.hash(exe) {
                Ok(hash) => current.push(TrackedFile {
                    path: exe.clone(),
                    hash,
                }),
                Err(e) => {
                    warn!(executable = ?exe, error = %e, "cannot hash executable");
                }
            }
        }
        current
    }
}
