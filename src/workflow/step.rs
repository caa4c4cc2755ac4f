// src/workflow/step.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConfigFile, StepTemplate};
use crate::errors::{Result, ScanflowError};
use crate::exec::Invocation;
use crate::types::WorkItemId;
use crate::workflow::template::{expand_args, expand_path};

/// A step template instantiated for one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    /// `<template>-<id>`; also the cache key.
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub timeout: Option<Duration>,
}

impl StepDefinition {
    pub fn instantiate(template: &StepTemplate, id: &WorkItemId, cfg: &ConfigFile) -> Result<Self> {
        let id_str = id.as_str();
        let inputs: Vec<PathBuf> = template
            .inputs
            .iter()
            .map(|t| cfg.resolve(expand_path(t, id_str)))
            .collect();
        let outputs: Vec<PathBuf> = template
            .outputs
            .iter()
            .map(|t| cfg.resolve(expand_path(t, id_str)))
            .collect();
        let args = expand_args(&template.args, id_str, &inputs, &outputs)
            .map_err(|e| ScanflowError::ConfigError(format!("step '{}': {e}", template.name)))?;

        Ok(Self {
            name: format!("{}-{}", template.name, id),
            program: resolve_program(&template.program, id_str, cfg),
            args,
            inputs,
            outputs,
            timeout: cfg.timeout_for(template.timeout.as_deref()),
        })
    }

    pub fn invocation(&self) -> Invocation {
        self.outputs.iter().fold(
            Invocation::new(&self.program).args(self.args.iter().cloned()),
            |inv, out| inv.produces(out.clone()),
        )
    }
}

/// `{id}` is expanded first; see [`ConfigFile::resolve_program`].
fn resolve_program(program: &str, id: &str, cfg: &ConfigFile) -> PathBuf {
    cfg.resolve_program(expand_path(program, id))
}
