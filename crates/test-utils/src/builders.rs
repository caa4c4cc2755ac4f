use std::path::{Path, PathBuf};

use scanflow::config::{
    ConfigFile, ConfigSection, RawConfigFile, StageConfig, StepTemplate, TrackConfig,
    WorkflowConfig,
};
use scanflow::stage::GearKind;
use scanflow::types::HashStorageMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// Relative paths in the built config resolve against `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                stage: Vec::new(),
                workflow: WorkflowConfig::default(),
                root: root.to_path_buf(),
            },
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.config.stage.push(stage);
        self
    }

    pub fn with_step(mut self, step: StepTemplate) -> Self {
        self.config.workflow.step.push(step);
        self
    }

    pub fn with_items(mut self, items: &[&str]) -> Self {
        self.config.workflow.items = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_required(mut self, pattern: &str) -> Self {
        self.config.workflow.required.push(pattern.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: &str) -> Self {
        self.config.config.timeout = Some(timeout.to_string());
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = jobs;
        self
    }

    pub fn with_hash_storage(mut self, mode: HashStorageMode) -> Self {
        self.config.config.hash_storage = mode;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(name: &str, kind: GearKind, executable: impl Into<PathBuf>) -> Self {
        Self {
            stage: StageConfig {
                name: name.to_string(),
                kind,
                executable: executable.into(),
                track: Vec::new(),
                output_dir: PathBuf::from("out"),
                args: Vec::new(),
                timeout: None,
            },
        }
    }

    pub fn track(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stage.track.push(TrackConfig {
            dir: dir.into(),
            include: Vec::new(),
        });
        self
    }

    pub fn track_matching(mut self, dir: impl Into<PathBuf>, include: &[&str]) -> Self {
        self.stage.track.push(TrackConfig {
            dir: dir.into(),
            include: include.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stage.output_dir = dir.into();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.stage.args.push(arg.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.stage.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// Builder for `StepTemplate`.
pub struct StepTemplateBuilder {
    step: StepTemplate,
}

impl StepTemplateBuilder {
    pub fn new(name: &str, program: &str) -> Self {
        Self {
            step: StepTemplate {
                name: name.to_string(),
                program: program.to_string(),
                args: vec!["{inputs}".to_string(), "{outputs}".to_string()],
                inputs: Vec::new(),
                outputs: Vec::new(),
                timeout: None,
            },
        }
    }

    pub fn input(mut self, path: &str) -> Self {
        self.step.inputs.push(path.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.step.outputs.push(path.to_string());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.step.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.step.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> StepTemplate {
        self.step
    }
}
