//! Integration tests for tracker lifecycle and identity assignment
//!
//! Both trackers are driven through the `TrackerBackend` trait object, the
//! way the tracking node holds them.

mod common;

use common::builders::DetectionsBuilder;
use falconflow::perception::{
    PerceptionError, PerceptionPluginManager, SimpleTracker, SortTracker, TrackStatus,
    TrackerBackend, TrackerConfig, TrackingResult,
};

fn loaded(kind: &str, config: TrackerConfig) -> Box<dyn TrackerBackend> {
    let mut tracker: Box<dyn TrackerBackend> = match kind {
        "sort" => Box::new(SortTracker::new(config)),
        _ => Box::new(SimpleTracker::new(config)),
    };
    tracker.load().unwrap();
    tracker
}

#[test]
fn test_not_loaded_leaves_detections_untouched() {
    for mut tracker in [
        Box::new(SimpleTracker::default()) as Box<dyn TrackerBackend>,
        Box::new(SortTracker::default()) as Box<dyn TrackerBackend>,
    ] {
        let mut dets = DetectionsBuilder::frame(0).bbox(0.0, 0.0, 10.0, 10.0).build();
        let mut out = TrackingResult::default();
        assert!(matches!(
            tracker.run(&mut dets, &mut out),
            Err(PerceptionError::NotLoaded)
        ));
        assert_eq!(dets.detections[0].track_id, None);
        assert!(out.tracks.is_empty());
    }
}

#[test]
fn test_ids_are_stable_and_unique() {
    for kind in ["simple", "sort"] {
        let mut tracker = loaded(kind, TrackerConfig::default());
        let mut out = TrackingResult::default();

        let mut f0 = DetectionsBuilder::frame(0)
            .bbox(0.0, 0.0, 20.0, 20.0)
            .bbox(100.0, 100.0, 20.0, 20.0)
            .build();
        tracker.run(&mut f0, &mut out).unwrap();
        assert_eq!(f0.detections[0].track_id, Some(1), "{}", kind);
        assert_eq!(f0.detections[1].track_id, Some(2), "{}", kind);

        let mut f1 = DetectionsBuilder::frame(1)
            .bbox(101.0, 100.0, 20.0, 20.0)
            .bbox(1.0, 1.0, 20.0, 20.0)
            .build();
        tracker.run(&mut f1, &mut out).unwrap();
        assert_eq!(f1.detections[0].track_id, Some(2), "{}", kind);
        assert_eq!(f1.detections[1].track_id, Some(1), "{}", kind);

        assert_eq!(out.frame_index, 1);
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(out.track(1).map(|t| t.trajectory.len()), Some(2));
        assert_eq!(tracker.active_track_count(), 2);
    }
}

#[test]
fn test_lost_tracks_reported_once() {
    for kind in ["simple", "sort"] {
        let config = TrackerConfig {
            max_missed_frames: 2,
            ..TrackerConfig::default()
        };
        let mut tracker = loaded(kind, config);
        let mut out = TrackingResult::default();

        let mut first = DetectionsBuilder::frame(0).bbox(10.0, 10.0, 10.0, 10.0).build();
        tracker.run(&mut first, &mut out).unwrap();

        let mut lost_reports = 0;
        for idx in 1..=5 {
            let mut empty = DetectionsBuilder::frame(idx).build();
            tracker.run(&mut empty, &mut out).unwrap();
            lost_reports += out
                .tracks
                .iter()
                .filter(|t| t.status == TrackStatus::Lost)
                .count();
            if idx == 3 {
                assert_eq!(out.tracks.len(), 1, "{}", kind);
                assert_eq!(out.tracks[0].track_id, 1);
            }
        }
        assert_eq!(lost_reports, 1, "{}", kind);
        assert_eq!(tracker.active_track_count(), 0);

        // Ids are not reused.
        let mut back = DetectionsBuilder::frame(6).bbox(10.0, 10.0, 10.0, 10.0).build();
        tracker.run(&mut back, &mut out).unwrap();
        assert_eq!(back.detections[0].track_id, Some(2), "{}", kind);
    }
}

#[test]
fn test_sort_keeps_identity_under_fast_motion() {
    let mut simple = loaded("simple", TrackerConfig::default());
    let mut sort = loaded("sort", TrackerConfig::default());

    // A short first step, then 12 px per frame on a 20 px box: consecutive
    // boxes overlap with IoU 0.25, below the default threshold.
    let mut simple_ids = Vec::new();
    let mut sort_ids = Vec::new();
    for (idx, x) in [0.0, 4.0, 16.0, 28.0, 40.0].into_iter().enumerate() {
        let mut out = TrackingResult::default();

        let mut dets = DetectionsBuilder::frame(idx as u32).bbox(x, 0.0, 20.0, 20.0).build();
        simple.run(&mut dets, &mut out).unwrap();
        simple_ids.push(dets.detections[0].track_id);

        let mut dets = DetectionsBuilder::frame(idx as u32).bbox(x, 0.0, 20.0, 20.0).build();
        sort.run(&mut dets, &mut out).unwrap();
        sort_ids.push(dets.detections[0].track_id);
    }

    assert_eq!(simple_ids, vec![Some(1), Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(sort_ids, vec![Some(1); 5]);
}

#[test]
fn test_reload_never_reuses_ids() {
    for kind in ["simple", "sort"] {
        let mut tracker = loaded(kind, TrackerConfig::default());
        let mut out = TrackingResult::default();
        let mut dets = DetectionsBuilder::frame(0)
            .bbox(0.0, 0.0, 5.0, 5.0)
            .bbox(50.0, 50.0, 5.0, 5.0)
            .build();
        tracker.run(&mut dets, &mut out).unwrap();

        tracker.unload();
        assert!(!tracker.is_loaded());
        assert_eq!(tracker.active_track_count(), 0);

        tracker.load().unwrap();
        let mut dets = DetectionsBuilder::frame(1).bbox(200.0, 200.0, 5.0, 5.0).build();
        tracker.run(&mut dets, &mut out).unwrap();
        let id = dets.detections[0].track_id;
        assert_ne!(id, Some(1), "{}: track id reused after reload", kind);
        assert_eq!(id, Some(3), "{}", kind);
    }
}

#[test]
fn test_manager_hands_out_loaded_trackers() {
    let manager = PerceptionPluginManager::with_builtin_backends();
    assert_eq!(manager.tracker_keys(), vec!["simple", "sort"]);

    let config = TrackerConfig {
        max_trajectory_points: 3,
        ..TrackerConfig::default()
    };
    let mut tracker = manager.create_tracker("sort", &config).unwrap();
    assert!(tracker.is_loaded());
    assert_eq!(tracker.name(), "sort");

    let mut out = TrackingResult::default();
    for idx in 0..6 {
        let mut dets = DetectionsBuilder::frame(idx).bbox(0.0, 0.0, 10.0, 10.0).build();
        tracker.run(&mut dets, &mut out).unwrap();
    }
    assert_eq!(out.tracks[0].trajectory.len(), 3);
    assert_eq!(out.tracks[0].trajectory[0].timestamp_ns, 3 * 33_000_000);

    assert!(manager.create_tracker("kalman", &config).is_none());
}
