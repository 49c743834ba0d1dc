//! Integration tests for the flow executor
//!
//! These tests validate the complete flow workflow:
//! - Loading definitions (and keeping the old one on bad input)
//! - Start/stop with the driver thread
//! - Parameter rejection reporting
//! - Hot update with rollback on failure
//! - Detector resolution through the plugin manager

mod common;

use common::builders::{perception_chain, FlowBuilder};
use common::{wait_until, BusRecorder};
use falconflow::perception::runtimes::ReplayRuntime;
use falconflow::perception::{
    BackendType, DetectorBackend, DetectorDescriptor, PerceptionPluginManager, YoloDetector,
};
use falconflow::pipeline::{FlowError, FlowExecutor, NodeFactory, NodeServices};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

fn executor() -> FlowExecutor {
    FlowExecutor::with_factory(Arc::new(NodeFactory::new())).with_tick_rate(200)
}

#[test]
fn test_bad_definitions_keep_previous() {
    let mut exec = executor();
    exec.load_flow(&FlowBuilder::new("first").node("cam", "camera_source").build())
        .unwrap();

    assert!(matches!(exec.load_flow("{not json"), Err(FlowError::Parse(_))));
    assert!(exec.load_flow(r#"{"nodes": []}"#).is_err());
    assert_eq!(exec.flow_definition().unwrap().flow_id, "first");
}

#[test]
fn test_start_without_definition() {
    let mut exec = executor();
    assert!(matches!(exec.start(), Err(FlowError::NoDefinition)));
    assert!(!exec.is_running());
}

#[test]
fn test_unknown_template_mounts_nothing() {
    let mut exec = executor();
    exec.load_flow(
        &FlowBuilder::new("broken")
            .node("cam", "camera_source")
            .node("x", "thermal_camera")
            .build(),
    )
    .unwrap();

    let err = exec.start().unwrap_err();
    assert!(matches!(err, FlowError::UnknownTemplate { ref template_id, .. } if template_id == "thermal_camera"));
    assert!(!exec.is_running());
    assert!(exec.pipeline().is_none());
}

#[test]
fn test_bad_edge_mounts_nothing() {
    let mut exec = executor();
    exec.load_flow(
        &FlowBuilder::new("broken")
            .node("cam", "camera_source")
            .node("trk", "tracking_transform")
            .edge(("cam", "video_out"), ("trk", "detection_in"))
            .build(),
    )
    .unwrap();

    assert!(matches!(exec.start(), Err(FlowError::Link { .. })));
    assert!(!exec.is_running());
}

#[test]
fn test_start_stop_restart() {
    let mut exec = executor();
    let recorder = BusRecorder::attach(exec.bus());
    exec.load_flow(&perception_chain("chain").build()).unwrap();

    exec.start().unwrap();
    assert!(exec.is_running());
    assert!(matches!(exec.start(), Err(FlowError::AlreadyRunning)));
    {
        let pipeline = exec.pipeline().unwrap();
        let pipeline = pipeline.lock();
        assert_eq!(pipeline.node_count(), 4);
        assert_eq!(pipeline.link_count(), 3);
    }
    assert!(wait_until(|| exec.tick_count() >= 3));
    assert!(wait_until(|| !recorder.in_category("event").is_empty()));

    exec.stop();
    assert!(!exec.is_running());
    assert!(exec.pipeline().is_none());
    assert_eq!(exec.flow_definition().unwrap().flow_id, "chain");
    assert!(recorder.contains("flow", "flow 'chain' stopped"));

    // Nothing is delivered once stop() has returned.
    let seen = recorder.messages().len();
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(recorder.messages().len(), seen);

    exec.start().unwrap();
    assert!(exec.is_running());
    exec.stop();
}

#[test]
fn test_rejected_parameters_reported_flow_still_starts() {
    let mut exec = executor();
    let recorder = BusRecorder::attach(exec.bus());
    exec.load_flow(
        &FlowBuilder::new("params")
            .node_with("ll", "low_light_adaptation", json!({"gamma": 9.0}))
            .node_with("cam", "camera_source", json!({"width": "wide"}))
            .build(),
    )
    .unwrap();

    exec.start().unwrap();
    let config = recorder.in_category("config");
    assert_eq!(config.len(), 2);
    assert!(config.iter().any(|m| m.contains("'ll'") && m.contains("gamma")));
    assert!(config.iter().any(|m| m.contains("'cam'")));
    exec.stop();
}

#[test]
fn test_hot_update_swaps_pipeline() {
    let mut exec = executor();
    exec.load_flow(&FlowBuilder::new("v1").node("env", "environment_detection").build())
        .unwrap();
    exec.start().unwrap();
    let old = exec.pipeline().unwrap();

    exec.update_flow(&perception_chain("v2").build()).unwrap();
    assert!(exec.is_running());
    assert_eq!(exec.flow_definition().unwrap().flow_id, "v2");
    let new = exec.pipeline().unwrap();
    assert!(!Arc::ptr_eq(&old, &new));
    assert!(new.lock().contains_node("trk"));
    assert!(!new.lock().contains_node("env"));
    assert!(old.lock().node("env").is_some());
    exec.stop();
}

#[test]
fn test_failed_hot_update_keeps_running_flow() {
    let mut exec = executor();
    exec.load_flow(&perception_chain("stable").build()).unwrap();
    exec.start().unwrap();
    let before = exec.pipeline().unwrap();

    let bad = FlowBuilder::new("bad")
        .node("cam", "camera_source")
        .node("cam", "camera_source")
        .build();
    assert!(exec.update_flow(&bad).is_err());
    assert!(exec.update_flow("garbage").is_err());

    assert!(exec.is_running());
    assert_eq!(exec.flow_definition().unwrap().flow_id, "stable");
    assert!(Arc::ptr_eq(&before, &exec.pipeline().unwrap()));
    let ticks = exec.tick_count();
    assert!(wait_until(|| exec.tick_count() > ticks));
    exec.stop();
}

#[test]
fn test_update_when_stopped_starts() {
    let mut exec = executor();
    exec.update_flow(&FlowBuilder::new("cold").node("cam", "camera_source").build())
        .unwrap();
    assert!(exec.is_running());
    exec.stop();
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");
    std::fs::write(&path, perception_chain("disk").build()).unwrap();

    let mut exec = executor();
    exec.load_flow_from_file(&path).unwrap();
    assert_eq!(exec.flow_definition().unwrap().nodes.len(), 4);
    assert!(matches!(
        exec.load_flow_from_file(dir.path().join("missing.json")),
        Err(FlowError::Io(_))
    ));
}

#[test]
fn test_detector_resolved_by_id_produces_tracks() {
    // Built-in trackers, with the CPU family replaced by a fixed tensor.
    let perception = Arc::new(PerceptionPluginManager::with_builtin_backends());
    perception.register_detector_backend(
        "GenericCPU",
        BackendType::GenericCpu,
        Arc::new(|desc: &DetectorDescriptor| -> anyhow::Result<Box<dyn DetectorBackend>> {
            let runtime = ReplayRuntime::from_rows(&[vec![2.0, 2.0, 2.0, 2.0, 6.0]]);
            Ok(Box::new(YoloDetector::new(desc.clone(), runtime)))
        }),
    );
    perception
        .register_detector_descriptor(
            DetectorDescriptor::new("replay", "none", BackendType::GenericCpu)
                .with_input_size(4, 4)
                .with_num_classes(1),
        )
        .unwrap();

    let flow = FlowBuilder::new("live")
        .node_with("cam", "camera_source", json!({"width": 32, "height": 24}))
        .node_with("det", "detection_transform", json!({"detector_id": "replay"}))
        .node_with("trk", "tracking_transform", json!({"tracker": "sort"}))
        .node("events", "event_reporter")
        .edge(("cam", "video_out"), ("det", "video_in"))
        .edge(("det", "detection_out"), ("trk", "detection_in"))
        .edge(("trk", "tracking_out"), ("events", "events"))
        .build();

    let mut exec = executor().with_services(NodeServices::new(perception));
    let recorder = BusRecorder::attach(exec.bus());
    exec.load_flow(&flow).unwrap();
    exec.start().unwrap();

    assert!(wait_until(|| recorder.in_category("event").len() >= 3));
    exec.stop();
    let events = recorder.in_category("event");
    assert!(events.iter().all(|e| e.contains("count=1 lost=0")));
    assert!(recorder.in_category("perception").is_empty());
}

#[test]
#[serial]
fn test_global_factory_catalog() {
    let factory = NodeFactory::global();
    factory.initialize_default_types();
    factory.initialize_default_types();
    for template in falconflow::pipeline::templates::ALL {
        assert!(factory.is_registered(template), "{} missing", template);
    }
    assert!(Arc::ptr_eq(&factory, &NodeFactory::global()));

    let mut exec = FlowExecutor::new().with_tick_rate(100);
    exec.load_flow(&FlowBuilder::new("global").node("cam", "camera_source").build())
        .unwrap();
    exec.start().unwrap();
    exec.stop();
}
