//! Node type registry.
//!
//! Maps template ids (the `template_id` field of a flow definition) to node
//! constructors. A process-wide instance is available through
//! [`NodeFactory::global`]; tests and embedders can build their own.

use crate::pipeline::node::Node;
use crate::pipeline::nodes::{
    CameraSourceNode, ClusterStateSourceNode, DetectionTransformNode, EnvironmentDetectionNode,
    EventReporterNode, LidarSlamNode, LowLightAdaptationNode, SearchPathPlannerNode,
    TrackingTransformNode, VisualSlamNode,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Template ids of the built-in catalog.
pub mod templates {
    pub const CAMERA_SOURCE: &str = "camera_source";
    pub const DETECTION_TRANSFORM: &str = "detection_transform";
    pub const TRACKING_TRANSFORM: &str = "tracking_transform";
    pub const ENVIRONMENT_DETECTION: &str = "environment_detection";
    pub const LOW_LIGHT_ADAPTATION: &str = "low_light_adaptation";
    pub const VISUAL_SLAM: &str = "visual_slam";
    pub const LIDAR_SLAM: &str = "lidar_slam";
    pub const CLUSTER_STATE_SOURCE: &str = "cluster_state_source";
    pub const SEARCH_PATH_PLANNER: &str = "search_path_planner";
    pub const EVENT_REPORTER: &str = "event_reporter";

    /// Every built-in template id.
    pub const ALL: &[&str] = &[
        CAMERA_SOURCE,
        DETECTION_TRANSFORM,
        TRACKING_TRANSFORM,
        ENVIRONMENT_DETECTION,
        LOW_LIGHT_ADAPTATION,
        VISUAL_SLAM,
        LIDAR_SLAM,
        CLUSTER_STATE_SOURCE,
        SEARCH_PATH_PLANNER,
        EVENT_REPORTER,
    ];
}

/// Builds a node from its id and the raw `parameters` value.
pub type NodeConstructor = Arc<dyn Fn(&str, &Value) -> Option<Box<dyn Node>> + Send + Sync>;

static GLOBAL: OnceLock<Arc<NodeFactory>> = OnceLock::new();

/// Registry of node constructors keyed by template id.
pub struct NodeFactory {
    constructors: RwLock<BTreeMap<String, NodeConstructor>>,
    defaults_registered: AtomicBool,
}

impl NodeFactory {
    /// An empty registry. Defaults are registered on first `create_node`.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
            defaults_registered: AtomicBool::new(false),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<NodeFactory> {
        GLOBAL.get_or_init(|| Arc::new(NodeFactory::new())).clone()
    }

    /// Bind `template_id` to a constructor, replacing any previous binding.
    pub fn register_node_type<F>(&self, template_id: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &Value) -> Option<Box<dyn Node>> + Send + Sync + 'static,
    {
        let template_id = template_id.into();
        tracing::debug!("Registering node type '{}'", template_id);
        self.constructors
            .write()
            .insert(template_id, Arc::new(constructor));
    }

    /// Register the built-in catalog. Safe to call repeatedly.
    pub fn initialize_default_types(&self) {
        if self
            .defaults_registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.register_node_type(templates::CAMERA_SOURCE, |id, _| {
            Some(Box::new(CameraSourceNode::new(id)))
        });
        self.register_node_type(templates::DETECTION_TRANSFORM, |id, _| {
            Some(Box::new(DetectionTransformNode::new(id)))
        });
        self.register_node_type(templates::TRACKING_TRANSFORM, |id, _| {
            Some(Box::new(TrackingTransformNode::new(id)))
        });
        self.register_node_type(templates::ENVIRONMENT_DETECTION, |id, _| {
            Some(Box::new(EnvironmentDetectionNode::new(id)))
        });
        self.register_node_type(templates::LOW_LIGHT_ADAPTATION, |id, _| {
            Some(Box::new(LowLightAdaptationNode::new(id)))
        });
        self.register_node_type(templates::VISUAL_SLAM, |id, _| {
            Some(Box::new(VisualSlamNode::new(id)))
        });
        self.register_node_type(templates::LIDAR_SLAM, |id, _| {
            Some(Box::new(LidarSlamNode::new(id)))
        });
        self.register_node_type(templates::CLUSTER_STATE_SOURCE, |id, _| {
            Some(Box::new(ClusterStateSourceNode::new(id)))
        });
        self.register_node_type(templates::SEARCH_PATH_PLANNER, |id, _| {
            Some(Box::new(SearchPathPlannerNode::new(id)))
        });
        self.register_node_type(templates::EVENT_REPORTER, |id, _| {
            Some(Box::new(EventReporterNode::new(id)))
        });

        tracing::info!(
            "Node factory initialized with {} types",
            self.registered_count()
        );
    }

    /// Construct a node. Returns `None` for an unknown template id.
    pub fn create_node(
        &self,
        template_id: &str,
        node_id: &str,
        params: &Value,
    ) -> Option<Box<dyn Node>> {
        self.initialize_default_types();
        // Clone the constructor out so it runs without the registry lock held.
        let constructor = self.constructors.read().get(template_id).cloned();
        match constructor {
            Some(ctor) => ctor(node_id, params),
            None => {
                tracing::warn!("Unknown node template '{}'", template_id);
                None
            }
        }
    }

    pub fn is_registered(&self, template_id: &str) -> bool {
        self.constructors.read().contains_key(template_id)
    }

    /// Registered template ids in sorted order.
    pub fn registered_types(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    pub fn registered_count(&self) -> usize {
        self.constructors.read().len()
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}
