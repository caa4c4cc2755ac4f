// src/workflow/template.rs

//! Command-line templates for workflow steps.
//!
//! Supported placeholders:
//! - `{id}` – the work-item ID (also allowed inside input/output paths)
//! - `{input.N}` / `{output.N}` – the N-th declared input / output path
//! - `{inputs}` / `{outputs}` – every declared input / output as separate
//!   arguments; only valid as a whole argument

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(id|inputs|outputs|input\.(\d+)|output\.(\d+))\}")
        .expect("placeholder regex is valid")
});

/// Substitute `{id}` in a path template.
pub fn expand_path(template: &str, id: &str) -> PathBuf {
    PathBuf::from(template.replace("{id}", id))
}

/// Check that every indexed placeholder is in range and that list
/// placeholders stand alone.
pub fn check_placeholders(args: &[String], n_inputs: usize, n_outputs: usize) -> Result<(), String> {
    for arg in args {
        if (arg.contains("{inputs}") && arg != "{inputs}")
            || (arg.contains("{outputs}") && arg != "{outputs}")
        {
            return Err(format!(
                "argument '{arg}': {{inputs}}/{{outputs}} must be a whole argument"
            ));
        }
        for caps in PLACEHOLDER.captures_iter(arg) {
            if let Some(idx) = caps.get(2) {
                let i: usize = idx.as_str().parse().map_err(|e| format!("{e}"))?;
                if i >= n_inputs {
                    return Err(format!(
                        "argument '{arg}' refers to input {i} but only {n_inputs} declared"
                    ));
                }
            }
            if let Some(idx) = caps.get(3) {
                let i: usize = idx.as_str().parse().map_err(|e| format!("{e}"))?;
                if i >= n_outputs {
                    return Err(format!(
                        "argument '{arg}' refers to output {i} but only {n_outputs} declared"
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Expand an argument template into the concrete argument list.
pub fn expand_args(
    args: &[String],
    id: &str,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
) -> Result<Vec<String>, String> {
    let mut expanded = Vec::with_capacity(args.len());

    for arg in args {
        match arg.as_str() {
            "{inputs}" => {
                expanded.extend(inputs.iter().map(|p| p.to_string_lossy().into_owned()));
                continue;
            }
            "{outputs}" => {
                expanded.extend(outputs.iter().map(|p| p.to_string_lossy().into_owned()));
                continue;
            }
            _ => {}
        }

        let mut error = None;
        let replaced = PLACEHOLDER.replace_all(arg, |caps: &Captures<'_>| {
            let value = if let Some(idx) = caps.get(2) {
                pick(inputs, idx.as_str())
            } else if let Some(idx) = caps.get(3) {
                pick(outputs, idx.as_str())
            } else if &caps[1] == "id" {
                Some(id.to_string())
            } else {
                None
            };
            value.unwrap_or_else(|| {
                error = Some(format!("argument '{arg}': cannot expand '{}'", &caps[0]));
                String::new()
            })
        });

        if let Some(err) = error {
            return Err(err);
        }
        expanded.push(replaced.into_owned());
    }

    Ok(expanded)
}

fn pick(list: &[PathBuf], idx: &str) -> Option<String> {
    idx.parse::<usize>()
        .ok()
        .and_then(|i| list.get(i))
        .map(|p| p.to_string_lossy().into_owned())
}
