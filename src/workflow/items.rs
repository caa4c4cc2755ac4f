// src/workflow/items.rs

//! Work items discovered from per-item directories.

use std::io;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::errors::Result;
use crate::types::WorkItemId;

/// Compile an item glob. `*` stops at `/`; use `**` to cross directories.
pub fn item_matcher(pattern: &str) -> std::result::Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern.trim_end_matches('/'))
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Directories under `root` whose relative path matches `pattern`, as work
/// items named after the directory. Hidden directories are never entered.
///
/// Sorted and deduplicated; an empty result is logged, not an error.
pub fn discover_items(root: &Path, pattern: &str) -> Result<Vec<WorkItemId>> {
    let matcher = item_matcher(pattern).map_err(anyhow::Error::from)?;
    let trimmed = Path::new(pattern.trim_end_matches('/'));
    let max_depth = if pattern.contains("**") {
        usize::MAX
    } else {
        trimmed.components().count()
    };

    let mut ids = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !matcher.is_match(relative) {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => {
                debug!(dir = ?entry.path(), "item directory");
                ids.push(WorkItemId::new(name));
            }
            None => warn!(dir = ?entry.path(), "item directory name is not UTF-8; skipped"),
        }
    }
    ids.sort();
    ids.dedup();

    if ids.is_empty() {
        warn!(pattern = %root.join(pattern).display(), "no directories match item glob");
    }
    Ok(ids)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}
