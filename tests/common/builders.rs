//! Test data builders for creating test objects

use falconflow::perception::{BoundingBox, Detection, DetectionResult};
use serde_json::{json, Value};

/// Builder for flow definition JSON
pub struct FlowBuilder {
    flow_id: String,
    nodes: Vec<Value>,
    edges: Vec<Value>,
}

impl FlowBuilder {
    pub fn new(flow_id: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(mut self, node_id: &str, template_id: &str) -> Self {
        self.nodes
            .push(json!({"node_id": node_id, "template_id": template_id}));
        self
    }

    pub fn node_with(mut self, node_id: &str, template_id: &str, parameters: Value) -> Self {
        self.nodes.push(json!({
            "node_id": node_id,
            "template_id": template_id,
            "parameters": parameters,
        }));
        self
    }

    pub fn edge(mut self, from: (&str, &str), to: (&str, &str)) -> Self {
        let edge_id = format!("e{}", self.edges.len() + 1);
        self.edges.push(json!({
            "edge_id": edge_id,
            "from_node_id": from.0,
            "from_port": from.1,
            "to_node_id": to.0,
            "to_port": to.1,
        }));
        self
    }

    pub fn to_value(&self) -> Value {
        json!({
            "flow_id": self.flow_id,
            "nodes": self.nodes,
            "edges": self.edges,
        })
    }

    pub fn build(self) -> String {
        self.to_value().to_string()
    }
}

/// Camera → detection → tracking → event reporter
pub fn perception_chain(flow_id: &str) -> FlowBuilder {
    FlowBuilder::new(flow_id)
        .node_with(
            "cam",
            "camera_source",
            json!({"width": 32, "height": 24, "pattern": "checker"}),
        )
        .node("det", "detection_transform")
        .node("trk", "tracking_transform")
        .node("events", "event_reporter")
        .edge(("cam", "video_out"), ("det", "video_in"))
        .edge(("det", "detection_out"), ("trk", "detection_in"))
        .edge(("trk", "tracking_out"), ("events", "events"))
}

/// Builder for one frame of detections
pub struct DetectionsBuilder {
    result: DetectionResult,
}

impl DetectionsBuilder {
    pub fn frame(frame_index: u32) -> Self {
        Self {
            result: DetectionResult::new("test", frame_index, frame_index as u64 * 33_000_000),
        }
    }

    /// Add a box with score 0.9 and class 0
    pub fn bbox(self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.scored(x, y, w, h, 0.9, 0)
    }

    pub fn scored(mut self, x: f32, y: f32, w: f32, h: f32, score: f32, class_id: i32) -> Self {
        self.result
            .detections
            .push(Detection::new(BoundingBox::new(x, y, w, h), score, class_id));
        self
    }

    pub fn build(self) -> DetectionResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_builder() {
        let value = FlowBuilder::new("f")
            .node("a", "camera_source")
            .node("b", "event_reporter")
            .edge(("a", "video_out"), ("b", "events"))
            .to_value();

        assert_eq!(value["flow_id"], "f");
        assert_eq!(value["nodes"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["edges"][0]["edge_id"], "e1");
    }
}
