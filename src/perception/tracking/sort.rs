use super::{push_history, TrackerBackend, TrackerConfig};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::{
    BoundingBox, DetectionResult, Track, TrackHistoryPoint, TrackStatus, TrackingResult,
};
use std::collections::BTreeMap;

/// Motion state of one SORT track, kept in center form.
#[derive(Debug, Clone)]
struct SortState {
    track_id: u32,
    cx: f32,
    cy: f32,
    width: f32,
    height: f32,
    /// Last observed box, reported as-is.
    observed: BoundingBox,
    /// Center displacement between the two latest observations.
    vx: f32,
    vy: f32,
    missed: u32,
    class_id: i32,
    class_name: Option<String>,
    trajectory: Vec<TrackHistoryPoint>,
}

impl SortState {
    fn new(track_id: u32, bbox: BoundingBox, class_id: i32, class_name: Option<String>) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            track_id,
            cx,
            cy,
            width: bbox.width,
            height: bbox.height,
            observed: bbox,
            vx: 0.0,
            vy: 0.0,
            missed: 0,
            class_id,
            class_name,
            trajectory: Vec::new(),
        }
    }

    /// Box expected this frame under constant velocity.
    fn predicted(&self) -> BoundingBox {
        BoundingBox::from_center(self.cx + self.vx, self.cy + self.vy, self.width, self.height)
    }

    fn observe(&mut self, bbox: BoundingBox) {
        let (cx, cy) = bbox.center();
        self.vx = cx - self.cx;
        self.vy = cy - self.cy;
        self.cx = cx;
        self.cy = cy;
        self.width = bbox.width;
        self.height = bbox.height;
        self.observed = bbox;
        self.missed = 0;
    }

    fn to_track(&self, status: TrackStatus) -> Track {
        Track {
            track_id: self.track_id,
            class_id: self.class_id,
            class_name: self.class_name.clone(),
            bbox: self.observed,
            status,
            trajectory: self.trajectory.clone(),
        }
    }
}

/// SORT-style tracker: greedy IoU matching against a constant-velocity
/// prediction of each track.
#[derive(Debug)]
pub struct SortTracker {
    config: TrackerConfig,
    states: BTreeMap<u32, SortState>,
    next_id: u32,
    loaded: bool,
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            next_id: 1,
            loaded: false,
        }
    }
}

impl Default for SortTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackerBackend for SortTracker {
    fn name(&self) -> &str {
        "sort"
    }

    fn load(&mut self) -> PerceptionResult<()> {
        self.loaded = true;
        tracing::debug!(
            "SORT tracker loaded (iou > {}, max missed {})",
            self.config.iou_threshold,
            self.config.max_missed_frames
        );
        Ok(())
    }

    fn unload(&mut self) {
        self.states.clear();
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn run(
        &mut self,
        detections: &mut DetectionResult,
        tracking: &mut TrackingResult,
    ) -> PerceptionResult<()> {
        if !self.loaded {
            return Err(PerceptionError::NotLoaded);
        }

        tracking.frame_id = detections.frame_id.clone();
        tracking.frame_index = detections.frame_index;
        tracking.timestamp_ns = detections.timestamp_ns;
        tracking.tracks.clear();

        let ts = detections.timestamp_ns;
        let cap = self.config.max_trajectory_points;

        // Predict every live track before any of them is updated.
        let predictions: Vec<(u32, BoundingBox)> = self
            .states
            .values()
            .map(|s| (s.track_id, s.predicted()))
            .collect();

        let mut det_used = vec![false; detections.detections.len()];
        for (id, predicted) in predictions {
            let hit = detections
                .detections
                .iter()
                .enumerate()
                .position(|(i, d)| !det_used[i] && predicted.iou(&d.bbox) > self.config.iou_threshold);
            let Some(state) = self.states.get_mut(&id) else {
                continue;
            };
            match hit {
                Some(i) => {
                    det_used[i] = true;
                    let det = &mut detections.detections[i];
                    det.track_id = Some(id);
                    state.observe(det.bbox);
                    state.class_id = det.class_id;
                    if det.class_name.is_some() {
                        state.class_name = det.class_name.clone();
                    }
                    push_history(&mut state.trajectory, ts, det.bbox, cap);
                    tracking.tracks.push(state.to_track(TrackStatus::Active));
                }
                None => state.missed += 1,
            }
        }

        for (i, det) in detections.detections.iter_mut().enumerate() {
            if det_used[i] {
                continue;
            }
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            det.track_id = Some(id);

            let mut state = SortState::new(id, det.bbox, det.class_id, det.class_name.clone());
            push_history(&mut state.trajectory, ts, det.bbox, cap);
            tracking.tracks.push(state.to_track(TrackStatus::Active));
            self.states.insert(id, state);
        }

        let max_missed = self.config.max_missed_frames;
        let expired: Vec<u32> = self
            .states
            .values()
            .filter(|s| s.missed > max_missed)
            .map(|s| s.track_id)
            .collect();
        for id in expired {
            if let Some(state) = self.states.remove(&id) {
                tracing::debug!("SORT track {} lost after {} missed frames", id, state.missed);
                tracking.tracks.push(state.to_track(TrackStatus::Lost));
            }
        }

        tracking.tracks.sort_by_key(|t| t.track_id);
        Ok(())
    }

    fn active_track_count(&self) -> usize {
        self.states.len()
    }
}
