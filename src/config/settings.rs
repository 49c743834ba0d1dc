//! Sections of the runtime configuration file.
//!
//! # Main Types
//!
//! - [`ExecutorSettings`] - Driver thread tick rate
//! - [`TrackerSettings`] - Defaults for tracking nodes that leave fields out
//! - [`LoggingSettings`] - Log filter and optional rolling log directory

use crate::perception::tracking::{
    DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_MISSED_FRAMES, DEFAULT_MAX_TRAJECTORY_POINTS,
};
use crate::perception::TrackerConfig;
use crate::pipeline::DEFAULT_TICK_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,falconflow=debug";

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Ticks per second for the driver thread; `0` runs unthrottled
    pub tick_rate_hz: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
        }
    }
}

impl ExecutorSettings {
    /// Time budget of one tick, `None` when unthrottled
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_rate_hz > 0).then(|| Duration::from_nanos(1_000_000_000 / self.tick_rate_hz as u64))
    }
}

/// Tracker defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Backend key (`simple` or `sort`)
    pub kind: String,
    pub iou_threshold: f32,
    pub max_missed_frames: u32,
    pub max_trajectory_points: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            kind: "simple".to_string(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
            max_trajectory_points: DEFAULT_MAX_TRAJECTORY_POINTS,
        }
    }
}

impl TrackerSettings {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            iou_threshold: self.iou_threshold,
            max_missed_frames: self.max_missed_frames,
            max_trajectory_points: self.max_trajectory_points,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,

    /// Directory for daily rolling log files; console only when unset
    pub log_dir: Option<PathBuf>,

    /// File name prefix inside `log_dir`
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            file_prefix: "falconflow.log".to_string(),
        }
    }
}
