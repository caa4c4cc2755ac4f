// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Scanflow.toml";

/// Load a configuration file and return the raw, unvalidated model.
///
/// `root` is set to the config file's directory so relative paths inside
/// the file are independent of the caller's working directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut config = parse_str(&contents)?;
    config.root = config_root_dir(path);
    Ok(config)
}

/// Parse TOML text. `root` is left empty (relative to the working dir).
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load and validate. This is the entry point the driver uses.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    ConfigFile::try_from(raw)
}

/// Directory containing the config file.
///
/// A bare file name like `Scanflow.toml` (parent = "") resolves to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
