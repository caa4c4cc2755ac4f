// src/fingerprint/store.rs

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::fingerprint::hash::compute_file_hash;
use crate::types::{HashStorageMode, WorkItemId};

/// Name of the hidden directory, inside each tracked directory, that holds
/// the sidecar records.
pub const SIDECAR_DIR: &str = ".scanflow";

/// Abstract storage for "last successfully processed" fingerprints.
///
/// Records must only be written once whatever consumed the file has
/// finished successfully; a crash in between leaves the file dirty.
///
/// Tool records are kept per work item: "item X last succeeded with tool
/// digest H". A failing item never holds back the record of the others.
pub trait FingerprintStore: Send + Sync {
    /// Fingerprint recorded for `path`, if any.
    fn recorded(&self, path: &Path) -> io::Result<Option<String>>;

    /// Persist `hash` for `path`, replacing any previous record.
    fn record(&mut self, path: &Path, hash: &str) -> io::Result<()>;

    /// Drop the record for `path` (no-op if there is none).
    fn forget(&mut self, path: &Path) -> io::Result<()>;

    /// Digest of `tool` as of the last success of `item`.
    fn recorded_tool(&self, item: &WorkItemId, tool: &Path) -> io::Result<Option<String>>;

    /// Persist that `item` succeeded with `tool` at digest `hash`.
    fn record_tool(&mut self, item: &WorkItemId, tool: &Path, hash: &str) -> io::Result<()>;

    /// Current content fingerprint of `path`.
    fn hash(&self, path: &Path) -> io::Result<String> {
        compute_file_hash(path)
    }

    /// True when the current fingerprint differs from the record, or when
    /// nothing was ever recorded.
    fn is_dirty(&self, path: &Path) -> io::Result<bool> {
        let current = self.hash(path)?;
        Ok(self.recorded(path)?.as_deref() != Some(current.as_str()))
    }
}

/// Build the store selected by `[config].hash_storage`.
///
/// `tool_dir` is where the sidecar store keeps tool records (normally
/// `<state_dir>/executables`); tools often live in directories the run
/// cannot write to.
pub fn store_for_mode(
    mode: HashStorageMode,
    namespace: &str,
    tool_dir: impl Into<PathBuf>,
) -> Box<dyn FingerprintStore> {
    match mode {
        HashStorageMode::Sidecar => Box::new(SidecarStore::new(namespace, tool_dir)),
        HashStorageMode::Memory => Box::new(MemoryStore::new()),
    }
}

/// Persists one small text file per tracked file.
///
/// For `<dir>/<name>` the record lives at
/// `<dir>/.scanflow/<namespace>/<name>.hash`. Each stage uses its own
/// namespace so two stages tracking the same directory keep independent
/// records. Tool records go to `<tool_dir>/<namespace>/<item>/<tool>.hash`.
#[derive(Debug, Clone)]
pub struct SidecarStore {
    namespace: String,
    tool_dir: PathBuf,
}

impl SidecarStore {
    pub fn new(namespace: impl Into<String>, tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            tool_dir: tool_dir.into(),
        }
    }

    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        dir.join(SIDECAR_DIR)
            .join(&self.namespace)
            .join(record_name(path))
    }

    pub fn tool_record_path(&self, item: &WorkItemId, tool: &Path) -> PathBuf {
        self.tool_dir
            .join(&self.namespace)
            .join(item.as_str())
            .join(record_name(tool))
    }
}

fn record_name(path: &Path) -> OsString {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".hash");
    name
}

fn read_record(record: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(record) {
        Ok(contents) => {
            let line = contents.lines().next().unwrap_or("").trim();
            if line.is_empty() {
                Ok(None)
            } else {
                Ok(Some(line.to_string()))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_record(record: &Path, hash: &str) -> io::Result<()> {
    if let Some(parent) = record.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write-then-rename so a crash never leaves a half-written record.
    let tmp = record.with_extension("hash.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "{hash}")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, record)
}

impl FingerprintStore for SidecarStore {
    fn recorded(&self, path: &Path) -> io::Result<Option<String>> {
        read_record(&self.sidecar_path(path))
    }

    fn record(&mut self, path: &Path, hash: &str) -> io::Result<()> {
        let sidecar = self.sidecar_path(path);
        write_record(&sidecar, hash)?;
        debug!(path = ?path, sidecar = ?sidecar, hash = %hash, "recorded fingerprint");
        Ok(())
    }

    fn forget(&mut self, path: &Path) -> io::Result<()> {
        let sidecar = self.sidecar_path(path);
        match fs::remove_file(&sidecar) {
            Ok(()) => {
                info!(path = ?path, "forgot fingerprint");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn recorded_tool(&self, item: &WorkItemId, tool: &Path) -> io::Result<Option<String>> {
        read_record(&self.tool_record_path(item, tool))
    }

    fn record_tool(&mut self, item: &WorkItemId, tool: &Path, hash: &str) -> io::Result<()> {
        let record = self.tool_record_path(item, tool);
        write_record(&record, hash)?;
        debug!(item = %item, tool = ?tool, record = ?record, "recorded tool fingerprint");
        Ok(())
    }
}

/// Keeps records in memory only (lost on exit).
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: HashMap<PathBuf, String>,
    tools: HashMap<(WorkItemId, PathBuf), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FingerprintStore for MemoryStore {
    fn recorded(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.map.get(path).cloned())
    }

    fn record(&mut self, path: &Path, hash: &str) -> io::Result<()> {
        self.map.insert(path.to_path_buf(), hash.to_string());
        debug!(path = ?path, hash = %hash, "recorded fingerprint (memory)");
        Ok(())
    }

    fn forget(&mut self, path: &Path) -> io::Result<()> {
        self.map.remove(path);
        Ok(())
    }

    fn recorded_tool(&self, item: &WorkItemId, tool: &Path) -> io::Result<Option<String>> {
        Ok(self.tools.get(&(item.clone(), tool.to_path_buf())).cloned())
    }

    fn record_tool(&mut self, item: &WorkItemId, tool: &Path, hash: &str) -> io::Result<()> {
        self.tools
            .insert((item.clone(), tool.to_path_buf()), hash.to_string());
        Ok(())
    }
}
