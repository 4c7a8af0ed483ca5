//! Configuration management for mltrack
//!
//! This module provides the tracking configuration value object, loaded either
//! from an `mltrack.toml` file or built as a struct literal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, TrackError};

/// File name used by [`TrackingConfig::load_or_default`] and [`TrackingConfig::write_default`]
pub const CONFIG_FILE_NAME: &str = "mltrack.toml";

/// Direction in which the early-stopping monitor improves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStoppingMode {
    /// Lower is better (losses)
    #[default]
    Min,
    /// Higher is better (accuracies)
    Max,
}

impl std::fmt::Display for EarlyStoppingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

impl std::str::FromStr for EarlyStoppingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "min" | "minimize" => Ok(Self::Min),
            "max" | "maximize" => Ok(Self::Max),
            _ => Err(format!("Invalid early stopping mode: {}", s)),
        }
    }
}

/// Tracking configuration, fixed once a tracker is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Experiment identifier, used in every output file name
    pub experiment_name: String,

    /// Model label
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Framework label
    #[serde(default = "default_framework")]
    pub framework: String,

    /// Directory for logs, reports, plots and sink output
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory for checkpoint artifacts
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Save a checkpoint every N epochs (0 disables)
    #[serde(default = "default_save_frequency")]
    pub save_frequency: u64,

    /// Number of checkpoints retained on disk
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,

    /// Epochs without improvement before stopping (0 disables)
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,

    /// Metric watched by early stopping
    #[serde(default = "default_monitor")]
    pub early_stopping_monitor: String,

    /// Improvement direction for the monitored metric
    #[serde(default)]
    pub early_stopping_mode: EarlyStoppingMode,

    /// Snapshots retained in memory
    #[serde(default = "default_history_size")]
    pub metric_history_size: usize,

    /// Write TensorBoard-style scalar events
    #[serde(default = "default_true")]
    pub enable_tensorboard: bool,

    /// Write W&B-style run history
    #[serde(default)]
    pub enable_wandb: bool,

    #[serde(default)]
    pub wandb_project: String,

    #[serde(default)]
    pub wandb_entity: String,

    /// Render SVG plots when saving a report
    #[serde(default = "default_true")]
    pub enable_plots: bool,
}

// Default value providers
fn default_model_name() -> String {
    "unknown".to_string()
}

fn default_framework() -> String {
    "pytorch".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_save_frequency() -> u64 {
    100
}

fn default_max_checkpoints() -> usize {
    5
}

fn default_patience() -> usize {
    10
}

fn default_monitor() -> String {
    "val_loss".to_string()
}

fn default_history_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl TrackingConfig {
    /// Default configuration for a named experiment
    pub fn new(experiment_name: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            ..Self::default()
        }
    }

    /// Check the invariants the tracker relies on
    pub fn validate(&self) -> Result<()> {
        let name = self.experiment_name.trim();
        if name.is_empty() {
            return Err(TrackError::Config(
                "experiment_name must not be empty".to_string(),
            ));
        }
        if name.contains(['/', '\\']) {
            return Err(TrackError::Config(format!(
                "experiment_name '{}' must not contain path separators",
                self.experiment_name
            )));
        }
        if self.metric_history_size == 0 {
            return Err(TrackError::Config(
                "metric_history_size must be at least 1".to_string(),
            ));
        }
        if self.max_checkpoints == 0 {
            return Err(TrackError::Config(
                "max_checkpoints must be at least 1".to_string(),
            ));
        }
        if self.early_stopping_patience > 0 && self.early_stopping_monitor.trim().is_empty() {
            return Err(TrackError::Config(
                "early_stopping_monitor must name a metric when patience is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TrackError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `mltrack.toml` from `dir`, or a default config named `experiment_name`
    pub fn load_or_default(dir: &Path, experiment_name: &str) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::from_toml_file(&config_path)
        } else {
            let config = Self::new(experiment_name);
            config.validate()?;
            Ok(config)
        }
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TrackError::Other(format!("Failed to serialize config: {}", e)))
    }

    /// Write a default `mltrack.toml` into `dir`, returning its path
    pub fn write_default(dir: &Path, experiment_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = Self::new(experiment_name).to_toml_string()?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            experiment_name: String::new(),
            model_name: default_model_name(),
            framework: default_framework(),
            log_dir: default_log_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            save_frequency: default_save_frequency(),
            max_checkpoints: default_max_checkpoints(),
            early_stopping_patience: default_patience(),
            early_stopping_monitor: default_monitor(),
            early_stopping_mode: EarlyStoppingMode::default(),
            metric_history_size: default_history_size(),
            enable_tensorboard: true,
            enable_wandb: false,
            wandb_project: String::new(),
            wandb_entity: String::new(),
            enable_plots: true,
        }
    }
}
