//! Built-in pipeline node implementations.
//!
//! Pad name constants live in each module (`camera_source::VIDEO_OUT`, ...).

pub mod camera_source;
pub mod cluster_state_source;
pub mod detection_transform;
pub mod environment_detection;
pub mod event_reporter;
pub mod lidar_slam;
pub mod low_light_adaptation;
pub mod search_path_planner;
pub mod tracking_transform;
pub mod visual_slam;

#[cfg(test)]
pub(crate) mod test_support;

pub use camera_source::{CameraSourceNode, FrameSource, TestPatternSource};
pub use cluster_state_source::ClusterStateSourceNode;
pub use detection_transform::DetectionTransformNode;
pub use environment_detection::{EnvironmentDetectionNode, EnvironmentState};
pub use event_reporter::{
    EventReporterHandle, EventReporterNode, SearchEvent, SearchEventType, SearchProgress,
};
pub use lidar_slam::LidarSlamNode;
pub use low_light_adaptation::LowLightAdaptationNode;
pub use search_path_planner::{
    haversine_distance, optimize_path, plan_search_path, point_in_polygon, SearchPathPlannerNode,
};
pub use tracking_transform::TrackingTransformNode;
pub use visual_slam::{PoseFileClient, SlamClient, VisualSlamNode};
