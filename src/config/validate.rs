// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::detect::naming::IdConvention;
use crate::errors::{Result, ScanflowError};
use crate::workflow::items::item_matcher;
use crate::workflow::template::check_placeholders;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScanflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_work(&raw)?;
        let default_timeout = validate_global_config(&raw)?;
        let id_convention = IdConvention::new(&raw.config.id_pattern).map_err(config_err)?;
        validate_stages(&raw)?;
        validate_workflow(&raw)?;
        validate_step_order(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, id_convention, default_timeout))
    }
}

fn config_err(msg: String) -> ScanflowError {
    ScanflowError::ConfigError(msg)
}

fn ensure_has_work(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() && cfg.workflow.step.is_empty() {
        return Err(config_err(
            "config must contain at least one [[stage]] or [[workflow.step]]".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<Option<std::time::Duration>> {
    if cfg.config.jobs == 0 {
        return Err(config_err("[config].jobs must be >= 1 (got 0)".to_string()));
    }

    match &cfg.config.timeout {
        Some(s) => parse_duration(s).map_err(|e| config_err(format!("[config].timeout: {e}"))),
        None => Ok(None),
    }
}

fn validate_stages(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for stage in &cfg.stage {
        if stage.name.trim().is_empty() {
            return Err(config_err("stage with empty name".to_string()));
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(config_err(format!("duplicate stage name '{}'", stage.name)));
        }
        if stage.executable.as_os_str().is_empty() {
            return Err(config_err(format!(
                "stage '{}' has an empty executable",
                stage.name
            )));
        }
        if stage.track.is_empty() {
            return Err(config_err(format!(
                "stage '{}' must track at least one directory",
                stage.name
            )));
        }
        for track in &stage.track {
            for pattern in &track.include {
                Glob::new(pattern).map_err(|e| {
                    config_err(format!(
                        "stage '{}': invalid include pattern '{}': {}",
                        stage.name, pattern, e
                    ))
                })?;
            }
        }
        if let Some(t) = &stage.timeout {
            parse_duration(t)
                .map_err(|e| config_err(format!("stage '{}': timeout: {}", stage.name, e)))?;
        }
    }

    Ok(())
}

fn validate_workflow(cfg: &RawConfigFile) -> Result<()> {
    let wf = &cfg.workflow;

    if !wf.step.is_empty() && wf.items.is_empty() && wf.item_glob.is_none() {
        warn!("[workflow] declares steps but no items; nothing will run");
    }

    if let Some(pattern) = &wf.item_glob {
        item_matcher(pattern)
            .map_err(|e| config_err(format!("[workflow].item_glob '{pattern}': {e}")))?;
    }

    let mut seen_items = HashSet::new();
    for item in &wf.items {
        if item.trim().is_empty() {
            return Err(config_err("[workflow].items contains an empty ID".to_string()));
        }
        if !seen_items.insert(item.as_str()) {
            return Err(config_err(format!("duplicate workflow item '{item}'")));
        }
    }

    let mut seen = HashSet::new();
    for step in &wf.step {
        if step.name.trim().is_empty() {
            return Err(config_err("workflow step with empty name".to_string()));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(config_err(format!(
                "duplicate workflow step name '{}'",
                step.name
            )));
        }
        if step.program.trim().is_empty() {
            return Err(config_err(format!(
                "workflow step '{}' has an empty program",
                step.name
            )));
        }
        if step.outputs.is_empty() {
            return Err(config_err(format!(
                "workflow step '{}' must declare at least one output",
                step.name
            )));
        }
        check_placeholders(&step.args, step.inputs.len(), step.outputs.len())
            .map_err(|e| config_err(format!("workflow step '{}': {}", step.name, e)))?;
        if let Some(t) = &step.timeout {
            parse_duration(t).map_err(|e| {
                config_err(format!("workflow step '{}': timeout: {}", step.name, e))
            })?;
        }
    }

    Ok(())
}

/// Steps run in declaration order; nothing is re-ordered. We still reject
/// cycles (which no order can satisfy) and warn when a step reads a file
/// that only a later step produces.
fn validate_step_order(cfg: &RawConfigFile) -> Result<()> {
    let steps = &cfg.workflow.step;

    let mut producer: HashMap<&str, usize> = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        for out in &step.outputs {
            if let Some(prev) = producer.insert(out.as_str(), idx) {
                return Err(config_err(format!(
                    "output '{}' is declared by both '{}' and '{}'",
                    out, steps[prev].name, step.name
                )));
            }
        }
    }

    // Edge direction: producer -> consumer.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for step in steps {
        graph.add_node(step.name.as_str());
    }

    for (idx, step) in steps.iter().enumerate() {
        for input in &step.inputs {
            if let Some(&p) = producer.get(input.as_str()) {
                graph.add_edge(steps[p].name.as_str(), step.name.as_str(), ());
                if p > idx {
                    warn!(
                        step = %step.name,
                        producer = %steps[p].name,
                        input = %input,
                        "step reads an output of a later step; it will see last run's file"
                    );
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ScanflowError::DagCycle(format!(
            "cycle detected between workflow steps involving '{}'",
            cycle.node_id()
        ))),
    }
}
