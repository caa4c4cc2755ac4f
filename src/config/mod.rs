// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: TOML-backed data model (raw and validated).
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: `TryFrom<RawConfigFile> for ConfigFile`; every check
//!   that must pass before any work item is touched.
//! - `duration.rs`: `"30m"`-style durations.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, parse_str, DEFAULT_CONFIG_FILE};
pub use model::{
    ConfigFile, ConfigSection, RawConfigFile, StageConfig, StepTemplate, TrackConfig,
    WorkflowConfig,
};
