//! Multi-object trackers.
//!
//! Both trackers honour one contract: each frame's detections are matched
//! greedily, in input order, against live tracks; unmatched detections open
//! new tracks; tracks missing for more than `max_missed_frames` frames are
//! reported once as [`TrackStatus::Lost`](crate::perception::TrackStatus)
//! and dropped. Track ids start at 1, grow monotonically for the lifetime
//! of a tracker instance and are never handed out twice, not even across
//! an `unload()`/`load()` cycle.

mod simple;
mod sort;

pub use simple::SimpleTracker;
pub use sort::SortTracker;

use crate::perception::error::PerceptionResult;
use crate::perception::types::{BoundingBox, DetectionResult, TrackHistoryPoint, TrackingResult};
use serde::{Deserialize, Serialize};

/// Minimum IoU (exclusive) for a detection to continue a track.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
/// Frames a track may go unmatched before it is lost.
pub const DEFAULT_MAX_MISSED_FRAMES: u32 = 5;
/// Trajectory points kept per track.
pub const DEFAULT_MAX_TRAJECTORY_POINTS: usize = 100;

/// Tracker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_threshold: f32,
    pub max_missed_frames: u32,
    pub max_trajectory_points: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
            max_trajectory_points: DEFAULT_MAX_TRAJECTORY_POINTS,
        }
    }
}

/// Frame-to-frame identity assignment.
pub trait TrackerBackend: Send {
    /// Tracker kind, e.g. `"simple"`.
    fn name(&self) -> &str;

    fn load(&mut self) -> PerceptionResult<()>;

    /// Drop all tracks. The id counter is kept, so tracks opened after the
    /// next `load()` continue the sequence.
    fn unload(&mut self);

    fn is_loaded(&self) -> bool;

    /// Assign `track_id` on matched detections and fill `tracking` with the
    /// tracks touched this frame. Fails with
    /// [`PerceptionError::NotLoaded`](crate::perception::PerceptionError)
    /// before `load()`, leaving `detections` untouched.
    fn run(
        &mut self,
        detections: &mut DetectionResult,
        tracking: &mut TrackingResult,
    ) -> PerceptionResult<()>;

    /// Number of live tracks.
    fn active_track_count(&self) -> usize;
}

pub(crate) fn push_history(trajectory: &mut Vec<TrackHistoryPoint>, timestamp_ns: u64, bbox: BoundingBox, cap: usize) {
    trajectory.push(TrackHistoryPoint { timestamp_ns, bbox });
    if trajectory.len() > cap {
        let excess = trajectory.len() - cap;
        trajectory.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let cfg: TrackerConfig = toml::from_str("iou_threshold = 0.5").unwrap();
        assert_eq!(cfg.iou_threshold, 0.5);
        assert_eq!(cfg.max_missed_frames, DEFAULT_MAX_MISSED_FRAMES);
        assert_eq!(cfg.max_trajectory_points, DEFAULT_MAX_TRAJECTORY_POINTS);
    }
}
