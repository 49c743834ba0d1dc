//! Configuration module for falconflow
//!
//! One TOML file configures a runtime instance: the executor tick rate,
//! tracker defaults, logging, and the detector catalog.
//!
//! # Config Location
//!
//! Without an explicit path the file is looked up in the platform config
//! directory under `falconflow/`:
//!
//! - **Linux**: `~/.config/falconflow/falconflow.toml`
//! - **macOS**: `~/Library/Application Support/falconflow/falconflow.toml`
//! - **Windows**: `%APPDATA%\falconflow\falconflow.toml`
//!
//! # Example
//!
//! ```toml
//! [executor]
//! tick_rate_hz = 15
//!
//! [tracker]
//! kind = "sort"
//! iou_threshold = 0.4
//!
//! [logging]
//! filter = "info"
//! log_dir = "/var/log/falconflow"
//!
//! catalogs = ["detectors.d/thermal.toml"]
//!
//! [[detectors]]
//! detector_id = "front"
//! model_path = "models/yolov8n.onnx"
//! backend = "GenericCPU"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{FalconError, Result, ResultExt};
use crate::perception::{DetectorCatalog, DetectorDescriptor, PerceptionPluginManager};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform config dir
pub const APP_ID: &str = "falconflow";

/// Config filename
pub const CONFIG_FILE: &str = "falconflow.toml";

// ==================== Config Directory ====================

/// Platform config directory for falconflow
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        FalconError::Config("Could not determine config directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }

    Ok(dir)
}

/// Path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Runtime Config ====================

/// Everything a runtime instance reads at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub tracker: TrackerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Extra detector catalog files, merged after `detectors`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalogs: Vec<PathBuf>,

    /// Detector catalog entries
    #[serde(default)]
    pub detectors: Vec<DetectorDescriptor>,
}

fn default_config_version() -> u32 {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            executor: ExecutorSettings::default(),
            tracker: TrackerSettings::default(),
            logging: LoggingSettings::default(),
            catalogs: Vec::new(),
            detectors: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Parse config text
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| FalconError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file. Relative detector paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content)?;

        if let Some(base) = path.parent() {
            for catalog in &mut config.catalogs {
                if catalog.is_relative() {
                    *catalog = base.join(&*catalog);
                }
            }
            for desc in &mut config.detectors {
                if desc.model_path.is_relative() {
                    desc.model_path = base.join(&desc.model_path);
                }
                if let Some(labels) = desc.label_path.as_mut() {
                    if labels.is_relative() {
                        *labels = base.join(&*labels);
                    }
                }
            }
        }
        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing default file yields defaults; any other failure is logged
    /// and also yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Self::default(),
            },
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Write the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FalconError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config {}", path.as_ref().display()))
    }

    /// Save to the default location
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = ensure_config_dir()?.join(CONFIG_FILE);
        self.save(&path)?;
        Ok(path)
    }

    /// Inline detector entries followed by those of every catalog file.
    pub fn catalog(&self) -> Result<DetectorCatalog> {
        let mut detectors = self.detectors.clone();
        for path in &self.catalogs {
            let extra = DetectorCatalog::from_file(path)
                .with_context(|| format!("Failed to load detector catalog {}", path.display()))?;
            detectors.extend(extra.detectors);
        }
        Ok(DetectorCatalog { detectors })
    }

    /// Register configured detectors; returns how many were added
    pub fn register_detectors(&self, manager: &PerceptionPluginManager) -> Result<usize> {
        Ok(self.catalog()?.register_into(manager))
    }
}
