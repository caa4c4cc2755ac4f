// src/detect/change_set.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::WorkItemId;

/// A tracked file together with the fingerprint observed during detection.
///
/// That fingerprint (not a fresh one) is what gets committed once the item
/// succeeds: if the file changes while the stage runs, it stays dirty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub hash: String,
}

/// The stale work items of one stage for one run.
///
/// Ordered (by ID) and deduplicated. Never persisted; recomputed on every
/// run from the fingerprint store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    items: BTreeMap<WorkItemId, Vec<TrackedFile>>,
    executables: Vec<TrackedFile>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) an item with the files to commit on success.
    pub fn insert(&mut self, id: WorkItemId, files: Vec<TrackedFile>) {
        self.items.entry(id).or_default().extend(files);
    }

    pub fn set_executables(&mut self, executables: Vec<TrackedFile>) {
        self.executables = executables;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &WorkItemId> {
        self.items.keys()
    }

    pub fn files_for(&self, id: &WorkItemId) -> &[TrackedFile] {
        self.items.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Current fingerprints of the stage's tools, recorded against every
    /// item that succeeds.
    pub fn executables(&self) -> &[TrackedFile] {
        &self.executables
    }
}
