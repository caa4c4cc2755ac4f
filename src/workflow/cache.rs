// src/workflow/cache.rs

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, ScanflowError};

/// Input fingerprint as of the last successful run of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedInput {
    pub path: PathBuf,
    pub hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    steps: BTreeMap<String, Vec<CachedInput>>,
}

/// Per-item workflow cache: step name → input fingerprints.
///
/// Stored as pretty JSON. The file is only created on the first write.
#[derive(Debug)]
pub struct WorkflowCache {
    path: PathBuf,
    doc: CacheDocument,
}

impl WorkflowCache {
    /// Load `path`; a missing file yields an empty cache. A file that
    /// exists but can't be read or parsed is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc: CacheDocument = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| cache_err(&path, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CacheDocument::default(),
            Err(e) => return Err(cache_err(&path, e)),
        };
        debug!(path = ?path, entries = doc.steps.len(), "loaded workflow cache");
        Ok(Self { path, doc })
    }

    /// An empty cache bound to `path`, ignoring whatever is on disk.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: CacheDocument::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, step: &str) -> Option<&[CachedInput]> {
        self.doc.steps.get(step).map(Vec::as_slice)
    }

    pub fn put(&mut self, step: impl Into<String>, inputs: Vec<CachedInput>) {
        self.doc.steps.insert(step.into(), inputs);
    }

    pub fn len(&self) -> usize {
        self.doc.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.steps.is_empty()
    }

    /// Drop every entry and persist the empty cache.
    pub fn clear(&mut self) -> Result<()> {
        self.doc.steps.clear();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.doc).map_err(|e| cache_err(&self.path, e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, entries = self.doc.steps.len(), "saved workflow cache");
        Ok(())
    }
}

fn cache_err(path: &Path, err: impl std::fmt::Display) -> ScanflowError {
    ScanflowError::CacheError {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
