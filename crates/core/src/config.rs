use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::executor::ExecutionMode;
use crate::params::ParamMap;
use crate::types::VideoFormat;

const ENV_DATA_DIR: &str = "FRAMESMOOTH_DATA_DIR";

/// A processing job: one raw planar input, a chain of filters, one output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub filters: Vec<FilterStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputConfig {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Frames per parallel batch; 0 picks one from the thread pool size.
    pub chunk_size: usize,
}

/// One filter in the chain.
///
/// `clips` maps a clip role (`clip`, `repairclip`, `pfclip`, ...) to either
/// `"input"` or the `id` of an earlier step. Without a `clip` entry the step
/// reads the previous step's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterStep {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub clips: HashMap<String, String>,
    #[serde(default)]
    pub params: ParamMap,
}

impl FilterStep {
    /// The id other steps use to reference this one.
    pub fn step_id(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}#{index}", self.name))
    }
}

impl JobConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read job file: {}", path.display()))?;
        let mut job = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse job file: {}", path.display()))?;

        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        Ok(job)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let job: Self = toml::from_str(raw).context("invalid job TOML")?;
        job.video_format()?;
        Ok(job)
    }

    pub fn video_format(&self) -> Result<VideoFormat> {
        VideoFormat::from_name(&self.input.format)
            .with_context(|| format!("unsupported input format '{}'", self.input.format))
    }

    /// Make input and output paths relative to `base` absolute.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.input.path = resolve_relative_to(base, &self.input.path);
        if let Some(output) = self.output.path.as_mut() {
            *output = resolve_relative_to(base, output);
        }
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. FRAMESMOOTH_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

/// Returns the path as-is if absolute, otherwise joins it to base.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
