//! Integration tests for graph construction and push delivery
//!
//! These tests validate:
//! - Link validation and its error variants
//! - Unlinking and node removal
//! - Execution order and end-to-end delivery across built-in nodes

mod common;

use common::BusRecorder;
use falconflow::perception::{DetectionResult, TrackingResult};
use falconflow::pipeline::packet::CameraFrame;
use falconflow::pipeline::{
    Bus, NodeContext, NodeFactory, NodeServices, Pipeline, PipelineError, WirePacket,
};
use serde_json::Value;

fn pipeline_with(nodes: &[(&str, &str)]) -> Pipeline {
    let factory = NodeFactory::new();
    let mut pipeline = Pipeline::default();
    for (id, template) in nodes {
        let node = factory
            .create_node(template, id, &Value::Null)
            .expect("built-in template");
        pipeline.add_node(node).unwrap();
    }
    pipeline
}

#[test]
fn test_link_rejections_leave_no_trace() {
    let mut p = pipeline_with(&[
        ("cam", "camera_source"),
        ("det", "detection_transform"),
        ("trk", "tracking_transform"),
        ("env", "environment_detection"),
    ]);

    assert!(matches!(
        p.link("ghost", "video_out", "det", "video_in"),
        Err(PipelineError::UnknownNode(_))
    ));
    assert!(matches!(
        p.link("cam", "nope", "det", "video_in"),
        Err(PipelineError::UnknownPad { .. })
    ));
    assert!(matches!(
        p.link("det", "video_in", "trk", "detection_in"),
        Err(PipelineError::DirectionMismatch { .. })
    ));
    assert!(matches!(
        p.link("cam", "video_out", "env", "env_status_out"),
        Err(PipelineError::DirectionMismatch { .. })
    ));
    assert!(matches!(
        p.link("cam", "video_out", "trk", "detection_in"),
        Err(PipelineError::CapsMismatch(_))
    ));
    assert_eq!(p.link_count(), 0);

    let trk_in = p.node("trk").and_then(|n| n.pad("detection_in")).unwrap();
    assert!(!trk_in.has_upstream());
}

#[test]
fn test_sink_accepts_one_upstream() {
    let mut p = pipeline_with(&[
        ("cam_a", "camera_source"),
        ("cam_b", "camera_source"),
        ("det", "detection_transform"),
    ]);
    p.link("cam_a", "video_out", "det", "video_in").unwrap();
    assert!(matches!(
        p.link("cam_b", "video_out", "det", "video_in"),
        Err(PipelineError::SinkAlreadyLinked { .. })
    ));

    p.unlink("cam_a", "video_out", "det", "video_in").unwrap();
    p.link("cam_b", "video_out", "det", "video_in").unwrap();
    assert!(p.has_link("cam_b", "video_out", "det", "video_in"));
    assert!(matches!(
        p.unlink("cam_a", "video_out", "det", "video_in"),
        Err(PipelineError::LinkNotFound(_))
    ));
}

#[test]
fn test_any_caps_sink_accepts_every_source() {
    let mut p = pipeline_with(&[
        ("env", "environment_detection"),
        ("planner", "search_path_planner"),
        ("events_a", "event_reporter"),
        ("events_b", "event_reporter"),
    ]);
    p.link("env", "env_status_out", "events_a", "events").unwrap();
    p.link("planner", "waypoints", "events_b", "events").unwrap();
    assert_eq!(p.link_count(), 2);
}

#[test]
fn test_duplicate_node_rejected() {
    let mut p = pipeline_with(&[("cam", "camera_source")]);
    let again = NodeFactory::new()
        .create_node("camera_source", "cam", &Value::Null)
        .unwrap();
    assert!(matches!(p.add_node(again), Err(PipelineError::DuplicateNode(_))));
    assert_eq!(p.node_count(), 1);
}

#[test]
fn test_removing_node_drops_its_links() {
    let mut p = pipeline_with(&[
        ("cam", "camera_source"),
        ("det", "detection_transform"),
    ]);
    p.link("cam", "video_out", "det", "video_in").unwrap();
    assert!(p.remove_node("det").is_some());
    assert_eq!(p.link_count(), 0);
    let cam_out = p.node("cam").and_then(|n| n.pad("video_out")).unwrap();
    assert_eq!(cam_out.connection_count(), 0);
}

#[test]
fn test_execution_order_follows_links() {
    let mut p = pipeline_with(&[
        ("a_events", "event_reporter"),
        ("b_trk", "tracking_transform"),
        ("c_det", "detection_transform"),
        ("d_cam", "camera_source"),
    ]);
    p.link("d_cam", "video_out", "c_det", "video_in").unwrap();
    p.link("c_det", "detection_out", "b_trk", "detection_in").unwrap();
    p.link("b_trk", "tracking_out", "a_events", "events").unwrap();

    assert_eq!(p.execution_order(), vec!["d_cam", "c_det", "b_trk", "a_events"]);
}

#[test]
fn test_chain_delivers_within_one_pass() {
    let mut p = pipeline_with(&[
        ("cam", "camera_source"),
        ("ll", "low_light_adaptation"),
        ("det", "detection_transform"),
        ("trk", "tracking_transform"),
        ("events", "event_reporter"),
    ]);
    p.link("cam", "video_out", "ll", "image_in").unwrap();
    p.link("ll", "image_out", "det", "video_in").unwrap();
    p.link("det", "detection_out", "trk", "detection_in").unwrap();
    p.link("trk", "tracking_out", "events", "events").unwrap();

    let bus = Bus::new();
    let recorder = BusRecorder::attach(&bus);
    let services = NodeServices::default();
    let mut ctx = NodeContext::new(&bus, &services);

    let order = p.execution_order();
    for id in &order {
        p.node_mut(id).unwrap().start(&mut ctx).unwrap();
    }
    for _ in 0..3 {
        for id in &order {
            p.node_mut(id).unwrap().process(&mut ctx);
        }
    }

    // No detector configured: empty detection packets, empty track sets.
    let events = recorder.in_category("event");
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.contains("tracks frame=") && e.contains("count=0")));
}

#[test]
fn test_packets_cross_pads_unchanged() {
    let frame = CameraFrame {
        width: 2,
        height: 1,
        stride: 6,
        format: Default::default(),
        frame_index: 9,
        timestamp_ns: 5,
        pixels: vec![1, 2, 3, 4, 5, 6],
    };
    let decoded = CameraFrame::decode(&frame.encode()).unwrap();
    assert_eq!(decoded, frame);

    let det = common::builders::DetectionsBuilder::frame(3).bbox(1.0, 1.0, 4.0, 4.0).build();
    assert_eq!(DetectionResult::decode(&det.encode()).unwrap(), det);
    assert!(TrackingResult::decode(&det.encode()).is_err());
}
