//! Perception: detector backends, the shared YOLO codec, trackers and the
//! plugin manager that hands them out by key.

pub mod backend;
pub mod catalog;
mod error;
pub mod plugin;
pub mod runtimes;
pub mod tracking;
pub mod types;
pub mod yolo;

pub use backend::{
    load_labels, DetectorBackend, InferenceRuntime, InferenceStats, RawTensor, YoloDetector,
};
pub use catalog::DetectorCatalog;
pub use error::{PerceptionError, PerceptionResult};
pub use plugin::{DetectorFactory, PerceptionPluginManager, TrackerFactory};
pub use tracking::{SimpleTracker, SortTracker, TrackerBackend, TrackerConfig};
pub use types::{
    BackendType, BoundingBox, Detection, DetectionResult, DetectorDescriptor, ImageView,
    PixelFormat, Precision, Track, TrackHistoryPoint, TrackStatus, TrackingResult,
};
