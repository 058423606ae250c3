//! YAML configuration of the engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::slam::options::TrackingOptions;

/// Config load error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Report output settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Append the experimental per-frame comparison table
    pub per_frame: bool,
}

/// Full engine configuration loaded from YAML
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputerConfig {
    /// Root of the data set, `Cache/` and `Result/` are created below it
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Converter index, 0 for Xtion and 1 for AIST
    #[serde(default)]
    pub converter: usize,

    #[serde(default)]
    pub tracking: TrackingOptions,

    #[serde(default)]
    pub report: ReportSection,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            converter: 0,
            tracking: TrackingOptions::default(),
            report: ReportSection::default(),
        }
    }
}

impl ComputerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Load from default config path (configs/config.yaml)
    pub fn load_default() -> Result<Self, ConfigLoadError> {
        let path = Path::new("configs/config.yaml");
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }
}
