// src/stage/gear.rs

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConfigFile, StageConfig};
use crate::errors::ItemError;
use crate::exec::Invocation;
use crate::stage::kinds::{FileRole, GearKind, Passing};
use crate::types::WorkItemId;

/// One unit of work for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run an external program.
    Run(Invocation),
    /// Copy a file verbatim (pass-through when there is nothing to do).
    Copy { from: PathBuf, to: PathBuf },
}

impl Action {
    /// Files that must exist once the action succeeded.
    pub fn produces(&self) -> Vec<&Path> {
        match self {
            Action::Run(invocation) => invocation.produces.iter().map(PathBuf::as_path).collect(),
            Action::Copy { to, .. } => vec![to.as_path()],
        }
    }
}

/// Everything needed to process one item, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSet {
    pub actions: Vec<Action>,
}

/// A stage variant: knows which files an item needs and produces, and how
/// to turn an item ID into program invocations.
pub trait Gear: Send + Sync {
    fn name(&self) -> &str;

    /// Build the actions for `id`. Fails with [`ItemError::MissingInput`]
    /// when a required input cannot be found.
    fn derive_arguments(&self, id: &WorkItemId) -> Result<ArgumentSet, ItemError>;

    /// Output paths for `id`; a missing one makes the item stale.
    fn expected_outputs(&self, id: &WorkItemId) -> Vec<PathBuf>;
}

/// The single parameterised gear used for every [`GearKind`].
///
/// Inputs are looked up in the search directories in order (normally the
/// stage's tracked directories); outputs go to `output_dir`.
#[derive(Debug, Clone)]
pub struct StageGear {
    name: String,
    kind: GearKind,
    executable: PathBuf,
    search_dirs: Vec<PathBuf>,
    output_dir: PathBuf,
    extra_args: Vec<String>,
}

impl StageGear {
    pub fn new(
        name: impl Into<String>,
        kind: GearKind,
        executable: impl Into<PathBuf>,
        search_dirs: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            executable: executable.into(),
            search_dirs,
            output_dir: output_dir.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn from_config(stage: &StageConfig, cfg: &ConfigFile) -> Self {
        let search_dirs = stage.track.iter().map(|t| cfg.resolve(&t.dir)).collect();
        Self::new(
            stage.name.clone(),
            stage.kind,
            cfg.resolve_program(&stage.executable),
            search_dirs,
            cfg.resolve(&stage.output_dir),
        )
        .with_args(stage.args.clone())
    }

    /// First existing `<dir>/<id>_<ROLE>.<ext>` across the search dirs.
    fn locate(&self, id: &WorkItemId, role: &FileRole) -> Option<PathBuf> {
        let file_name = id.file_name(role.role, role.ext);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|p| p.is_file())
    }

    /// Path reported when an input is missing.
    fn expected_input_path(&self, id: &WorkItemId, role: &FileRole) -> PathBuf {
        let file_name = id.file_name(role.role, role.ext);
        match self.search_dirs.first() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    fn output_path(&self, id: &WorkItemId, role: &FileRole) -> PathBuf {
        self.output_dir.join(id.file_name(role.role, role.ext))
    }
}

fn push_file(invocation: Invocation, passing: Passing, path: &Path) -> Invocation {
    let path = path.display().to_string();
    match passing {
        Passing::Flag(flag) => invocation.arg(flag).arg(path),
        Passing::Positional => invocation.arg(path),
    }
}

impl Gear for StageGear {
    fn name(&self) -> &str {
        &self.name
    }

    fn derive_arguments(&self, id: &WorkItemId) -> Result<ArgumentSet, ItemError> {
        let mut required = Vec::new();
        let mut resolved = Vec::new();
        let mut optional_missing = false;

        for role in self.kind.inputs() {
            match self.locate(id, role) {
                Some(path) => {
                    if !role.optional {
                        required.push(path.clone());
                    }
                    resolved.push((role, path));
                }
                None if role.optional => {
                    debug!(item = %id, role = role.role, "optional input absent");
                    optional_missing = true;
                }
                None => return Err(ItemError::MissingInput(self.expected_input_path(id, role))),
            }
        }

        let outputs: Vec<(&FileRole, PathBuf)> = self
            .kind
            .outputs()
            .iter()
            .map(|role| (role, self.output_path(id, role)))
            .collect();

        if optional_missing && self.kind.copies_when_optional_missing() {
            let actions = required
                .into_iter()
                .zip(outputs)
                .map(|(from, (_, to))| Action::Copy { from, to })
                .collect();
            return Ok(ArgumentSet { actions });
        }

        let mut invocation = Invocation::new(&self.executable).args(self.extra_args.iter().cloned());
        for (role, path) in &resolved {
            invocation = push_file(invocation, role.passing, path);
        }
        for (role, path) in &outputs {
            invocation = push_file(invocation, role.passing, path).produces(path.clone());
        }

        Ok(ArgumentSet {
            actions: vec![Action::Run(invocation)],
        })
    }

    fn expected_outputs(&self, id: &WorkItemId) -> Vec<PathBuf> {
        self.kind
            .outputs()
            .iter()
            .map(|role| self.output_path(id, role))
            .collect()
    }
}
