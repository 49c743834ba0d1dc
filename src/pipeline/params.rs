//! Structured node parameters.
//!
//! Flow definitions carry an untyped JSON `parameters` object per node.
//! `NodeParams::from_json` turns it into the variant matching the node's
//! template id, so each node type only ever sees its own parameter struct.
//! Range checks run here too; the executor reports failures on the bus and
//! leaves the node on its defaults.

use crate::pipeline::factory::templates;
use crate::pipeline::nodes::EnvironmentState;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Parameter application errors.
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("parameters for '{template_id}' have the wrong shape: {source}")]
    Shape {
        template_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("node expected {expected} parameters")]
    Mismatch { expected: &'static str },
}

impl ParamError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ParamError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parameters for one node, tagged by node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeParams {
    /// No parameters supplied.
    None,
    CameraSource(CameraSourceParams),
    Detection(DetectionParams),
    Tracking(TrackingParams),
    Environment(EnvironmentParams),
    LowLight(LowLightParams),
    VisualSlam(SlamParams),
    LidarSlam(SlamParams),
    ClusterState(ClusterStateParams),
    SearchPlanner(SearchPlannerParams),
    EventReporter(EventReporterParams),
    /// Parameters for a template the runtime has no schema for.
    Opaque(Value),
}

fn parse<T>(template_id: &str, value: &Value) -> Result<T, ParamError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(value).map_err(|source| ParamError::Shape {
        template_id: template_id.to_string(),
        source,
    })
}

impl NodeParams {
    /// Decode and validate `value` for the given template.
    pub fn from_json(template_id: &str, value: &Value) -> Result<NodeParams, ParamError> {
        let empty = Value::Object(Default::default());
        let value = if value.is_null() { &empty } else { value };

        let params = match template_id {
            templates::CAMERA_SOURCE => NodeParams::CameraSource(parse(template_id, value)?),
            templates::DETECTION_TRANSFORM => NodeParams::Detection(parse(template_id, value)?),
            templates::TRACKING_TRANSFORM => NodeParams::Tracking(parse(template_id, value)?),
            templates::ENVIRONMENT_DETECTION => {
                NodeParams::Environment(parse(template_id, value)?)
            }
            templates::LOW_LIGHT_ADAPTATION => NodeParams::LowLight(parse(template_id, value)?),
            templates::VISUAL_SLAM => NodeParams::VisualSlam(parse(template_id, value)?),
            templates::LIDAR_SLAM => NodeParams::LidarSlam(parse(template_id, value)?),
            templates::CLUSTER_STATE_SOURCE => {
                NodeParams::ClusterState(parse(template_id, value)?)
            }
            templates::SEARCH_PATH_PLANNER => {
                NodeParams::SearchPlanner(parse(template_id, value)?)
            }
            templates::EVENT_REPORTER => NodeParams::EventReporter(parse(template_id, value)?),
            _ if value.as_object().is_some_and(|o| o.is_empty()) => NodeParams::None,
            _ => NodeParams::Opaque(value.clone()),
        };
        params.validate()?;
        Ok(params)
    }

    /// Range checks for the typed variants.
    pub fn validate(&self) -> Result<(), ParamError> {
        match self {
            NodeParams::CameraSource(p) => p.validate(),
            NodeParams::Tracking(p) => p.validate(),
            NodeParams::Environment(p) => p.validate(),
            NodeParams::LowLight(p) => p.validate(),
            NodeParams::ClusterState(p) => p.validate(),
            NodeParams::SearchPlanner(p) => p.validate(),
            NodeParams::None
            | NodeParams::Detection(_)
            | NodeParams::VisualSlam(_)
            | NodeParams::LidarSlam(_)
            | NodeParams::EventReporter(_)
            | NodeParams::Opaque(_) => Ok(()),
        }
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ParamError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ParamError::invalid(
            field,
            format!("{} is outside [{}, {}]", value, min, max),
        ))
    }
}

// ── Sensors ──

/// Synthetic frame pattern for the built-in camera source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPattern {
    #[default]
    Gradient,
    Solid,
    Checker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSourceParams {
    pub width: u32,
    pub height: u32,
    /// `RGB8` or `BGR8`.
    pub format: String,
    pub pattern: TestPattern,
    /// Base intensity of the generated frames.
    pub brightness: u8,
}

impl Default for CameraSourceParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: "RGB8".to_string(),
            pattern: TestPattern::Gradient,
            brightness: 128,
        }
    }
}

impl CameraSourceParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("width", self.width as f64, 1.0, 8192.0)?;
        check_range("height", self.height as f64, 1.0, 8192.0)?;
        if self.format != "RGB8" && self.format != "BGR8" {
            return Err(ParamError::invalid(
                "format",
                format!("'{}' is not RGB8 or BGR8", self.format),
            ));
        }
        Ok(())
    }
}

// ── Perception ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Descriptor id resolved through the perception plugin manager.
    pub detector_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// Tracker backend key (`simple`, `sort`, or a registered plugin).
    pub tracker: String,
    pub iou_threshold: f32,
    pub max_missed_frames: u32,
    pub max_trajectory_points: usize,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            tracker: "simple".to_string(),
            iou_threshold: crate::perception::tracking::DEFAULT_IOU_THRESHOLD,
            max_missed_frames: crate::perception::tracking::DEFAULT_MAX_MISSED_FRAMES,
            max_trajectory_points: crate::perception::tracking::DEFAULT_MAX_TRAJECTORY_POINTS,
        }
    }
}

impl TrackingParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("iou_threshold", self.iou_threshold as f64, 0.0, 1.0)?;
        if self.max_trajectory_points == 0 {
            return Err(ParamError::invalid("max_trajectory_points", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentParams {
    pub default_state: EnvironmentState,
    pub confidence: f32,
}

impl Default for EnvironmentParams {
    fn default() -> Self {
        Self {
            default_state: EnvironmentState::Normal,
            confidence: 1.0,
        }
    }
}

impl EnvironmentParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.confidence.is_nan() {
            return Err(ParamError::invalid("confidence", "is not a number"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowLightParams {
    pub gamma: f32,
    /// Mean luminance below which frames are enhanced.
    pub brightness_threshold: u8,
}

impl Default for LowLightParams {
    fn default() -> Self {
        Self {
            gamma: 1.5,
            brightness_threshold: 80,
        }
    }
}

impl LowLightParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if !(self.gamma > 0.0 && self.gamma <= 4.0) {
            return Err(ParamError::invalid(
                "gamma",
                format!("{} is outside (0, 4]", self.gamma),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamParams {
    /// Emit an identity pose when no SLAM client is available.
    pub output_when_no_client: bool,
}

impl Default for SlamParams {
    fn default() -> Self {
        Self {
            output_when_no_client: true,
        }
    }
}

// ── Cluster ──

/// Maximum members carried by a cluster state packet.
pub const MAX_CLUSTER_MEMBERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStateParams {
    pub self_id: String,
    /// `leader`, `follower` or `standalone`.
    pub role: String,
    /// Comma-separated string or list of member ids.
    #[serde(deserialize_with = "deserialize_members")]
    pub members: Vec<String>,
}

impl Default for ClusterStateParams {
    fn default() -> Self {
        Self {
            self_id: String::new(),
            role: "standalone".to_string(),
            members: Vec::new(),
        }
    }
}

impl ClusterStateParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if !matches!(self.role.as_str(), "leader" | "follower" | "standalone") {
            return Err(ParamError::invalid(
                "role",
                format!("'{}' is not leader, follower or standalone", self.role),
            ));
        }
        if self.members.len() > MAX_CLUSTER_MEMBERS {
            return Err(ParamError::invalid(
                "members",
                format!("{} members exceed the limit of {}", self.members.len(), MAX_CLUSTER_MEMBERS),
            ));
        }
        Ok(())
    }
}

fn deserialize_members<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Members {
        Csv(String),
        List(Vec<String>),
    }

    let ids = match Members::deserialize(deserializer)? {
        Members::Csv(s) => s.split(',').map(|id| id.trim().to_string()).collect(),
        Members::List(list) => list,
    };
    Ok(ids.into_iter().filter(|id| !id.is_empty()).collect())
}

// ── Mission ──

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }
}

/// Coverage pattern for the search planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchPattern {
    #[default]
    LawnMower,
    Spiral,
    Zigzag,
    Sector,
    WaypointList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchArea {
    pub polygon: Vec<GeoPoint>,
    pub min_altitude: f64,
    pub max_altitude: f64,
}

impl Default for SearchArea {
    fn default() -> Self {
        Self {
            polygon: Vec::new(),
            min_altitude: 0.0,
            max_altitude: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub pattern: SearchPattern,
    /// Flight altitude in metres.
    pub altitude: f64,
    /// Ground speed in m/s.
    pub speed: f64,
    /// Track spacing in metres.
    pub spacing: f64,
    /// Loiter time per waypoint in seconds.
    pub loiter_time: f64,
    pub enable_detection: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            pattern: SearchPattern::LawnMower,
            altitude: 50.0,
            speed: 10.0,
            spacing: 20.0,
            loiter_time: 2.0,
            enable_detection: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPlannerParams {
    pub search_area: SearchArea,
    pub search_params: SearchParams,
    /// Explicit route for `WAYPOINT_LIST`.
    pub waypoints: Vec<GeoPoint>,
}

impl SearchPlannerParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        let area = &self.search_area;
        if !area.polygon.is_empty() && area.polygon.len() < 3 {
            return Err(ParamError::invalid(
                "search_area.polygon",
                format!("needs at least 3 points, got {}", area.polygon.len()),
            ));
        }
        for p in area.polygon.iter().chain(self.waypoints.iter()) {
            check_range("lat", p.lat, -90.0, 90.0)?;
            check_range("lon", p.lon, -180.0, 180.0)?;
        }
        check_range("search_area.min_altitude", area.min_altitude, 0.0, 10_000.0)?;
        check_range("search_area.max_altitude", area.max_altitude, 0.0, 10_000.0)?;
        if area.min_altitude >= area.max_altitude {
            return Err(ParamError::invalid(
                "search_area.min_altitude",
                format!(
                    "{} must be below max_altitude {}",
                    area.min_altitude, area.max_altitude
                ),
            ));
        }

        let sp = &self.search_params;
        check_range("search_params.altitude", sp.altitude, 0.0, 10_000.0)?;
        check_range("search_params.speed", sp.speed, 0.0, 50.0)?;
        check_range("search_params.spacing", sp.spacing, 1.0, 1000.0)?;
        check_range("search_params.loiter_time", sp.loiter_time, 0.0, 3600.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventReporterParams {
    pub uav_id: String,
    pub mission_id: String,
}

impl Default for EventReporterParams {
    fn default() -> Self {
        Self {
            uav_id: "uav_001".to_string(),
            mission_id: "mission_unknown".to_string(),
        }
    }
}
