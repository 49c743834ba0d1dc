//! Core perception data types.
//!
//! Boxes are always top-left form in source-image pixel space unless a
//! function says otherwise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Axis-aligned box, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from center form.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same size, moved so its center is at `(cx, cy)`.
    pub fn with_center(&self, cx: f32, cy: f32) -> Self {
        Self::from_center(cx, cy, self.width, self.height)
    }

    /// Scale X and Y independently.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }

    /// Intersection over union. Zero when either box is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let area_a = self.area();
        let area_b = other.area();
        if area_a <= 0.0 || area_b <= 0.0 {
            return 0.0;
        }

        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = area_a + area_b - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub class_id: i32,
    pub class_name: Option<String>,
    /// Set by a tracker.
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, class_id: i32) -> Self {
        Self {
            bbox,
            score,
            class_id,
            class_name: None,
            track_id: None,
        }
    }
}

/// All detections for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame_id: String,
    pub frame_index: u32,
    pub timestamp_ns: u64,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(frame_id: impl Into<String>, frame_index: u32, timestamp_ns: u64) -> Self {
        Self {
            frame_id: frame_id.into(),
            frame_index,
            timestamp_ns,
            detections: Vec::new(),
        }
    }
}

/// Interleaved 8-bit pixel layouts understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    #[serde(rename = "RGB8")]
    Rgb8,
    #[serde(rename = "BGR8")]
    Bgr8,
}

impl PixelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RGB8" | "RGB" => Some(PixelFormat::Rgb8),
            "BGR8" | "BGR" => Some(PixelFormat::Bgr8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        3
    }

    pub fn is_bgr(self) -> bool {
        self == PixelFormat::Bgr8
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of an interleaved image.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    pub format: PixelFormat,
}

impl<'a> ImageView<'a> {
    /// A tightly packed view (`stride = width * 3`).
    pub fn packed(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride: width * format.bytes_per_pixel() as u32,
            format,
        }
    }

    /// Whether dimensions, stride and buffer length are consistent.
    pub fn is_valid(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        let stride = self.stride as usize;
        if stride < row_bytes {
            return false;
        }
        let needed = stride * (self.height as usize - 1) + row_bytes;
        self.data.len() >= needed
    }
}

/// Inference hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendType {
    #[serde(rename = "NPU")]
    Npu,
    #[default]
    #[serde(rename = "GenericCPU")]
    GenericCpu,
    #[serde(rename = "GenericGPU")]
    GenericGpu,
}

impl BackendType {
    /// Plugin manager key for this backend family.
    pub fn key(self) -> &'static str {
        match self {
            BackendType::Npu => "NPU",
            BackendType::GenericCpu => "GenericCPU",
            BackendType::GenericGpu => "GenericGPU",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "NPU" => Some(BackendType::Npu),
            "GenericCPU" => Some(BackendType::GenericCpu),
            "GenericGPU" => Some(BackendType::GenericGpu),
            _ => None,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Numeric precision requested from the inference runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    #[serde(rename = "FP32")]
    Fp32,
    #[serde(rename = "FP16")]
    Fp16,
    #[serde(rename = "INT8")]
    Int8,
}

/// Default model input edge in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 640;
/// Default class count (COCO).
pub const DEFAULT_NUM_CLASSES: u32 = 80;
/// Default minimum class probability.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.25;
/// Default NMS IoU threshold.
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

/// Immutable description of a detector model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorDescriptor {
    pub detector_id: String,
    #[serde(default)]
    pub name: String,
    pub model_path: PathBuf,
    #[serde(default)]
    pub label_path: Option<PathBuf>,
    #[serde(default, alias = "backend")]
    pub backend_type: BackendType,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default = "default_num_classes")]
    pub num_classes: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

fn default_num_classes() -> u32 {
    DEFAULT_NUM_CLASSES
}

fn default_score_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_nms_threshold() -> f32 {
    DEFAULT_NMS_THRESHOLD
}

impl DetectorDescriptor {
    pub fn new(
        detector_id: impl Into<String>,
        model_path: impl Into<PathBuf>,
        backend_type: BackendType,
    ) -> Self {
        let detector_id = detector_id.into();
        Self {
            name: detector_id.clone(),
            detector_id,
            model_path: model_path.into(),
            label_path: None,
            backend_type,
            device_index: 0,
            precision: Precision::Fp32,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            num_classes: DEFAULT_NUM_CLASSES,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }

    pub fn with_num_classes(mut self, num_classes: u32) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_thresholds(mut self, score: f32, nms: f32) -> Self {
        self.score_threshold = score;
        self.nms_threshold = nms;
        self
    }

    pub fn with_labels(mut self, label_path: impl Into<PathBuf>) -> Self {
        self.label_path = Some(label_path.into());
        self
    }
}

/// Whether a track is still being followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackStatus {
    #[default]
    Active,
    Lost,
}

/// One observed position of a track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackHistoryPoint {
    pub timestamp_ns: u64,
    pub bbox: BoundingBox,
}

/// A persistent identity across frames.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    pub track_id: u32,
    pub class_id: i32,
    pub class_name: Option<String>,
    pub bbox: BoundingBox,
    pub status: TrackStatus,
    /// Most recent positions, oldest first.
    pub trajectory: Vec<TrackHistoryPoint>,
}

/// Tracks touched in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingResult {
    pub frame_id: String,
    pub frame_index: u32,
    pub timestamp_ns: u64,
    pub tracks: Vec<Track>,
}

impl TrackingResult {
    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let b = BoundingBox::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let flat = BoundingBox::new(0.0, 0.0, 10.0, 0.0);
        assert_eq!(a.iou(&flat), 0.0);
    }

    #[test]
    fn test_center_conversions() {
        let b = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b, BoundingBox::new(40.0, 35.0, 20.0, 10.0));
        assert_eq!(b.center(), (50.0, 40.0));
        assert_eq!(b.with_center(0.0, 0.0), BoundingBox::new(-10.0, -5.0, 20.0, 10.0));
    }

    #[test]
    fn test_image_view_validation() {
        let data = vec![0u8; 4 * 2 * 3];
        assert!(ImageView::packed(&data, 4, 2, PixelFormat::Rgb8).is_valid());
        assert!(!ImageView::packed(&data, 5, 2, PixelFormat::Rgb8).is_valid());
        let padded = ImageView {
            data: &data,
            width: 3,
            height: 2,
            stride: 12,
            format: PixelFormat::Bgr8,
        };
        assert!(padded.is_valid());
    }

    #[test]
    fn test_descriptor_defaults_from_toml() {
        let desc: DetectorDescriptor = toml::from_str(
            r#"
            detector_id = "yolo"
            model_path = "models/yolo.onnx"
            backend = "NPU"
            "#,
        )
        .unwrap();
        assert_eq!(desc.backend_type, BackendType::Npu);
        assert_eq!(desc.input_width, 640);
        assert_eq!(desc.num_classes, 80);
        assert_eq!(desc.score_threshold, 0.25);
        assert_eq!(desc.nms_threshold, 0.45);
        assert_eq!(desc.precision, Precision::Fp32);
    }

    #[test]
    fn test_backend_keys() {
        for ty in [BackendType::Npu, BackendType::GenericCpu, BackendType::GenericGpu] {
            assert_eq!(BackendType::from_key(ty.key()), Some(ty));
        }
        assert_eq!(BackendType::from_key("TPU"), None);
    }
}
