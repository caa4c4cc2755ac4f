// src/detect/naming.rs

use std::fmt;

use regex::Regex;

use crate::types::WorkItemId;

/// Default ID pattern: everything before the first `_` or `.`.
///
/// `1052_LANDMARKS.fcsv` → `1052`.
pub const DEFAULT_ID_PATTERN: &str = r"^([^_.]+)_";

/// Maps a file name to the work item it belongs to.
#[derive(Clone)]
pub struct IdConvention {
    pattern: Regex,
}

impl fmt::Debug for IdConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdConvention")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

impl IdConvention {
    /// Compile `pattern`. It must contain at least one capture group; group 1
    /// is the work-item ID.
    pub fn new(pattern: &str) -> Result<Self, String> {
        let pattern =
            Regex::new(pattern).map_err(|e| format!("invalid id_pattern '{pattern}': {e}"))?;
        if pattern.captures_len() < 2 {
            return Err(format!(
                "id_pattern '{}' must contain a capture group for the work-item ID",
                pattern.as_str()
            ));
        }
        Ok(Self { pattern })
    }

    /// Extract the work-item ID from a bare file name, if it follows the
    /// convention.
    pub fn item_id(&self, file_name: &str) -> Option<WorkItemId> {
        let caps = self.pattern.captures(file_name)?;
        let id = caps.get(1)?.as_str();
        if id.is_empty() {
            None
        } else {
            Some(WorkItemId::new(id))
        }
    }
}

impl Default for IdConvention {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_ID_PATTERN).expect("default id pattern is valid"),
        }
    }
}
