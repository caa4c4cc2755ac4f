// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::detect::naming::{IdConvention, DEFAULT_ID_PATTERN};
use crate::stage::GearKind;
use crate::types::HashStorageMode;

/// Configuration exactly as read from the TOML file.
///
/// ```toml
/// [config]
/// timeout = "30m"
/// jobs = 2
///
/// [[stage]]
/// name = "laplace"
/// kind = "laplace_solution"
/// executable = "bin/ComputeLaplaceSolution"
/// track = [{ dir = "Output/Cut" }, { dir = "Input/Landmarks" }]
/// output_dir = "Output/Heatflow"
///
/// [workflow]
/// items = ["1052"]
/// item_glob = "data/1*"
///
/// [[workflow.step]]
/// name = "Threshold"
/// program = "bin/ThresholdLaplaceSolution"
/// args = ["{inputs}", "{outputs}"]
/// inputs = ["data/{id}/{id}_HEATFLOW.mha"]
/// outputs = ["data/{id}/{id}_HEATFLOW_THRESHOLDED.vtu"]
/// ```
///
/// Turned into a [`ConfigFile`] through `TryFrom`, which runs validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Pipeline stages, run in declaration order.
    #[serde(default)]
    pub stage: Vec<StageConfig>,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Directory relative paths are resolved against. Set by the loader to
    /// the directory containing the config file.
    #[serde(skip)]
    pub root: PathBuf,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Default deadline per external invocation (`"30m"`, `"none"`).
    #[serde(default)]
    pub timeout: Option<String>,

    /// Worker pool size used when a stage processes its change set.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default)]
    pub hash_storage: HashStorageMode,

    /// Where failure logs and run logs are written.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Where workflow caches and tool records live (workflow caches can be
    /// moved with `[workflow].cache`).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Regex with one capture group extracting the work-item ID from a
    /// file name.
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
}

fn default_jobs() -> usize {
    1
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".scanflow")
}

fn default_id_pattern() -> String {
    DEFAULT_ID_PATTERN.to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            timeout: None,
            jobs: default_jobs(),
            hash_storage: HashStorageMode::default(),
            log_dir: default_log_dir(),
            state_dir: default_state_dir(),
            id_pattern: default_id_pattern(),
        }
    }
}

/// `[[stage]]` entry: one gear applied to every stale work item.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,

    /// Which gear variant this stage runs.
    pub kind: GearKind,

    /// External tool: a bare name is looked up on `PATH`. Its fingerprint is
    /// tracked per item, so a new build makes every item stale once.
    pub executable: PathBuf,

    /// Directories whose files are fingerprinted and in which upstream
    /// inputs are looked up, in order.
    pub track: Vec<TrackConfig>,

    /// Where this stage writes its outputs.
    pub output_dir: PathBuf,

    /// Literal arguments placed before the derived ones.
    #[serde(default)]
    pub args: Vec<String>,

    /// Overrides `[config].timeout` for this stage.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// One tracked directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackConfig {
    pub dir: PathBuf,

    /// Optional glob patterns on the file name; empty means "all files".
    #[serde(default)]
    pub include: Vec<String>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Work items to instantiate the step templates for.
    #[serde(default)]
    pub items: Vec<String>,

    /// Glob (relative to the config directory) over per-item directories;
    /// each matching directory's name is a work item, added after `items`.
    #[serde(default)]
    pub item_glob: Option<String>,

    /// Files (with `{id}`) that must exist before an item is attempted.
    #[serde(default)]
    pub required: Vec<String>,

    /// Cache file location (with `{id}`); defaults to
    /// `<state_dir>/workflow/{id}.json`.
    #[serde(default)]
    pub cache: Option<String>,

    /// Step templates, executed in declaration order.
    #[serde(default)]
    pub step: Vec<StepTemplate>,
}

/// `[[workflow.step]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepTemplate {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Validated configuration.
///
/// Obtain one via `ConfigFile::try_from(raw)` (see `validate.rs`); every
/// duration and pattern in here is known to parse.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub stage: Vec<StageConfig>,
    pub workflow: WorkflowConfig,
    root: PathBuf,
    id_convention: IdConvention,
    default_timeout: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        id_convention: IdConvention,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            config: raw.config,
            stage: raw.stage,
            workflow: raw.workflow,
            root: raw.root,
            id_convention,
            default_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a config-relative path. Absolute paths pass through.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Resolve a program to run.
    ///
    /// A bare name (no directory component) is looked up on `PATH`; when it
    /// isn't found there it is returned unchanged and spawning reports the
    /// error. Anything else resolves like a config path.
    pub fn resolve_program(&self, program: impl AsRef<Path>) -> PathBuf {
        let program = program.as_ref();
        if program.is_absolute() || program.components().count() > 1 {
            return self.resolve(program);
        }
        std::env::var_os("PATH")
            .and_then(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(program))
                    .find(|candidate| candidate.is_file())
            })
            .unwrap_or_else(|| program.to_path_buf())
    }

    pub fn id_convention(&self) -> &IdConvention {
        &self.id_convention
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.config.log_dir)
    }

    /// Where stages record which tool build each item last succeeded with.
    pub fn executable_records_dir(&self) -> PathBuf {
        self.resolve(&self.config.state_dir).join("executables")
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Effective deadline for an entry with an optional override.
    pub fn timeout_for(&self, override_str: Option<&str>) -> Option<Duration> {
        match override_str {
            // Validation already rejected unparsable overrides.
            Some(s) => super::duration::parse_duration(s).unwrap_or(self.default_timeout),
            None => self.default_timeout,
        }
    }

    /// Cache file for one workflow item.
    pub fn workflow_cache_path(&self, id: &str) -> PathBuf {
        match &self.workflow.cache {
            Some(template) => self.resolve(template.replace("{id}", id)),
            None => self
                .resolve(&self.config.state_dir)
                .join("workflow")
                .join(format!("{id}.json")),
        }
    }

    pub fn find_stage(&self, name: &str) -> Option<&StageConfig> {
        self.stage.iter().find(|s| s.name == name)
    }
}
