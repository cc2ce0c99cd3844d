//! Annotator configuration
//!
//! Defaults can be overridden from environment variables (`Config::from_env`) and
//! then from command-line arguments in `main`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::annotate::engine::{EngineConfig, TieBreak};
use crate::annotate::grouper::ColorTable;
use crate::annotate::rules::RuleTable;
use crate::geojson::parser::DEFAULT_MAX_INPUT_SIZE;

/// Errors in configuration; these abort the whole run
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read class configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse class configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Main annotator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of `<id>_cell_detection.geojson` files
    pub detection_dir: PathBuf,
    /// Directory of `<id>_cells.geojson` files
    pub segmentation_dir: PathBuf,
    /// Directory of ROI annotation files (names start with `<id>`)
    pub annotation_dir: PathBuf,
    /// Directory receiving the outputs
    pub output_dir: PathBuf,
    /// Number of slides processed concurrently
    pub num_workers: usize,
    /// Maximum input file size in bytes
    pub max_input_size: u64,
    /// Engine configuration
    pub engine: EngineConfig,
    /// Classification rules and colors
    pub classes: ClassConfig,
}

/// Transition rules and colors, validated together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default)]
    pub transitions: RuleTable,
    #[serde(default)]
    pub colors: ColorTable,
}

impl ClassConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.colors.is_empty() {
            return Err(ConfigError::Invalid("color table is empty".into()));
        }
        self.transitions.validate(&self.colors)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection_dir: PathBuf::new(),
            segmentation_dir: PathBuf::new(),
            annotation_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            num_workers: 4,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            engine: EngineConfig::default(),
            classes: ClassConfig::default(),
        }
    }
}

/// Megabytes to bytes, clamped at `u64::MAX`
fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = env::var("ANNOTATOR_NUM_WORKERS")
            && let Ok(n) = val.parse()
        {
            config.num_workers = n;
        }
        if let Ok(val) = env::var("ANNOTATOR_MAX_INPUT_MB")
            && let Ok(mb) = val.parse::<u64>()
        {
            config.max_input_size = mb_to_bytes(mb);
        }
        if let Ok(val) = env::var("ANNOTATOR_PARALLEL_POINTS") {
            config.engine.parallel_points = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("ANNOTATOR_TIE_BREAK") {
            config.engine.tie_break = val.parse::<TieBreak>().map_err(ConfigError::Invalid)?;
        }
        if let Ok(path) = env::var("ANNOTATOR_CLASS_CONFIG")
            && !path.is_empty()
        {
            config.classes = ClassConfig::load(Path::new(&path))?;
        }

        Ok(config)
    }

    /// Check the configuration before any job is dispatched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid("num_workers must be at least 1".into()));
        }
        for (name, dir) in [
            ("detection", &self.detection_dir),
            ("segmentation", &self.segmentation_dir),
            ("annotation", &self.annotation_dir),
        ] {
            if !dir.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "{} directory {:?} does not exist",
                    name, dir
                )));
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output directory not set".into()));
        }
        self.classes.validate()
    }
}
