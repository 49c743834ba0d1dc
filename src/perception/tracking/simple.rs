use super::{push_history, TrackerBackend, TrackerConfig};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::{
    BoundingBox, DetectionResult, Track, TrackStatus, TrackingResult,
};
use std::collections::BTreeMap;

/// IoU tracker matching each detection against a track's last box.
#[derive(Debug)]
pub struct SimpleTracker {
    config: TrackerConfig,
    /// Live tracks with their consecutive missed-frame count.
    tracks: BTreeMap<u32, (Track, u32)>,
    next_id: u32,
    loaded: bool,
}

impl SimpleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            loaded: false,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn open_track(&mut self, bbox: BoundingBox, class_id: i32, class_name: Option<String>, timestamp_ns: u64) -> u32 {
        let id = self.allocate_id();
        let mut track = Track {
            track_id: id,
            class_id,
            class_name,
            bbox,
            status: TrackStatus::Active,
            trajectory: Vec::new(),
        };
        push_history(&mut track.trajectory, timestamp_ns, bbox, self.config.max_trajectory_points);
        self.tracks.insert(id, (track, 0));
        id
    }
}

impl Default for SimpleTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackerBackend for SimpleTracker {
    fn name(&self) -> &str {
        "simple"
    }

    fn load(&mut self) -> PerceptionResult<()> {
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        self.tracks.clear();
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

        let timestamp_ns = detections.timestamp_ns;
        let TrackerConfig {
            iou_threshold,
            max_missed_frames,
            max_trajectory_points,
        } = self.config;
        let mut claimed = vec![false; detections.detections.len()];
        let mut touched = Vec::new();
        let mut lost = Vec::new();

        for (&id, (track, missed)) in self.tracks.iter_mut() {
            let matched = detections
                .detections
                .iter()
                .enumerate()
                .find(|(i, d)| !claimed[*i] && track.bbox.iou(&d.bbox) > iou_threshold)
                .map(|(i, _)| i);

            let Some(i) = matched else {
                *missed += 1;
                if *missed > max_missed_frames {
                    track.status = TrackStatus::Lost;
                    lost.push(id);
                }
                continue;
            };

            claimed[i] = true;
            let det = &mut detections.detections[i];
            det.track_id = Some(id);
            *missed = 0;
            track.bbox = det.bbox;
            track.class_id = det.class_id;
            if det.class_name.is_some() {
                track.class_name = det.class_name.clone();
            }
            track.status = TrackStatus::Active;
            push_history(&mut track.trajectory, timestamp_ns, det.bbox, max_trajectory_points);
            touched.push(id);
        }

        for i in 0..detections.detections.len() {
            if claimed[i] {
                continue;
            }
            let det = &detections.detections[i];
            let id = self.open_track(det.bbox, det.class_id, det.class_name.clone(), timestamp_ns);
            detections.detections[i].track_id = Some(id);
            touched.push(id);
        }

        for id in &lost {
            if let Some((track, missed)) = self.tracks.remove(id) {
                tracing::debug!("Track {} lost after {} missed frames", id, missed);
                tracking.tracks.push(track);
            }
        }
        for id in touched {
            if let Some((track, _)) = self.tracks.get(&id) {
                tracking.tracks.push(track.clone());
            }
        }
        tracking.tracks.sort_by_key(|t| t.track_id);
        Ok(())
    }

    fn active_track_count(&self) -> usize {
        self.tracks.len()
    }
}
