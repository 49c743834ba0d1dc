//! Detector backend abstraction.
//!
//! A [`DetectorBackend`] turns an image into a [`DetectionResult`]. The
//! shipped implementation is [`YoloDetector`], which owns the shared YOLO
//! codec and delegates only the tensor-in/tensor-out step to an
//! [`InferenceRuntime`]. Hardware families differ in their runtime, never in
//! decoding.

use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::{DetectionResult, DetectorDescriptor, ImageView};
use crate::perception::yolo;
use std::path::Path;
use std::time::Instant;

/// Size of the rolling window for recent inference times
const RECENT_WINDOW_SIZE: usize = 64;

/// Inference timing statistics for one detector.
#[derive(Debug, Clone, Default)]
pub struct InferenceStats {
    pub runs: u64,
    pub failures: u64,
    pub total_time_us: u64,
    pub last_time_us: u64,
    pub max_time_us: u64,
    /// Detections emitted by the last successful run
    pub last_detection_count: usize,
    recent: Vec<u64>,
}

impl InferenceStats {
    pub fn record_success(&mut self, time_us: u64, detections: usize) {
        self.runs += 1;
        self.total_time_us += time_us;
        self.last_time_us = time_us;
        self.max_time_us = self.max_time_us.max(time_us);
        self.last_detection_count = detections;

        if self.recent.len() == RECENT_WINDOW_SIZE {
            self.recent.remove(0);
        }
        self.recent.push(time_us);
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn avg_time_us(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.runs as f64
        }
    }

    /// Mean over the recent window.
    pub fn recent_avg_time_us(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().sum::<u64>() as f64 / self.recent.len() as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Object detector interface.
///
/// Implementations are synchronous and single-caller; callers that share a
/// detector across threads wrap it in a mutex.
pub trait DetectorBackend: Send {
    /// Descriptor this backend was created from.
    fn descriptor(&self) -> &DetectorDescriptor;

    /// Prepare the model. Calling it on a loaded backend is a no-op.
    fn load(&mut self) -> PerceptionResult<()>;

    fn is_loaded(&self) -> bool;

    /// Detect objects in `image`, replacing the contents of
    /// `result.detections`. Fails with [`PerceptionError::NotLoaded`] before
    /// `load()`.
    fn run(&mut self, image: &ImageView<'_>, result: &mut DetectionResult) -> PerceptionResult<()>;

    /// Release model resources. Safe to call when not loaded.
    fn unload(&mut self);

    /// Inference statistics, when the backend keeps them.
    fn stats(&self) -> Option<&InferenceStats> {
        None
    }
}

/// Raw network output in channel-major layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTensor {
    pub data: Vec<f32>,
    pub num_channels: usize,
    pub num_boxes: usize,
}

impl RawTensor {
    pub fn new(data: Vec<f32>, num_channels: usize, num_boxes: usize) -> Self {
        Self {
            data,
            num_channels,
            num_boxes,
        }
    }

    /// Empty output with the given channel count.
    pub fn empty(num_channels: usize) -> Self {
        Self::new(Vec::new(), num_channels, 0)
    }
}

/// The hardware-specific part of a detector: load a model, run one
/// `[1, 3, h, w]` float tensor through it.
pub trait InferenceRuntime: Send {
    fn name(&self) -> &str;

    fn load(&mut self, descriptor: &DetectorDescriptor) -> PerceptionResult<()>;

    /// `input` is planar RGB in `[0, 1]`, `width * height * 3` values.
    fn infer(&mut self, input: &[f32], width: u32, height: u32) -> PerceptionResult<RawTensor>;

    fn unload(&mut self);
}

/// Read a label file: one class name per line, blank lines skipped.
pub fn load_labels(path: &Path) -> PerceptionResult<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// YOLO detector over any [`InferenceRuntime`].
pub struct YoloDetector<R: InferenceRuntime> {
    descriptor: DetectorDescriptor,
    runtime: R,
    loaded: bool,
    labels: Vec<String>,
    input: Vec<f32>,
    stats: InferenceStats,
}

impl<R: InferenceRuntime> YoloDetector<R> {
    pub fn new(descriptor: DetectorDescriptor, runtime: R) -> Self {
        Self {
            descriptor,
            runtime,
            loaded: false,
            labels: Vec::new(),
            input: Vec::new(),
            stats: InferenceStats::default(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn class_name(&self, class_id: i32) -> Option<String> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .cloned()
    }

    fn detect(&mut self, image: &ImageView<'_>, result: &mut DetectionResult) -> PerceptionResult<()> {
        if !image.is_valid() {
            return Err(PerceptionError::InvalidImage(format!(
                "{}x{} stride {} with {} bytes",
                image.width,
                image.height,
                image.stride,
                image.data.len()
            )));
        }

        let (in_w, in_h) = (self.descriptor.input_width, self.descriptor.input_height);
        self.input.resize(in_w as usize * in_h as usize * 3, 0.0);
        if !yolo::resize_image_to_float_nchw(
            image.data,
            image.width,
            image.height,
            image.stride,
            image.format.is_bgr(),
            &mut self.input,
            in_w,
            in_h,
        ) {
            return Err(PerceptionError::InvalidImage("resize failed".to_string()));
        }

        let tensor = self.runtime.infer(&self.input, in_w, in_h)?;
        let num_classes = self.descriptor.num_classes as usize;
        if tensor.num_boxes > 0 && tensor.num_channels < 4 + num_classes {
            return Err(PerceptionError::TensorShape(format!(
                "{} channels for {} classes",
                tensor.num_channels, num_classes
            )));
        }
        if tensor.data.len() < tensor.num_channels * tensor.num_boxes {
            return Err(PerceptionError::TensorShape(format!(
                "{} values for {}x{}",
                tensor.data.len(),
                tensor.num_channels,
                tensor.num_boxes
            )));
        }

        let raw = yolo::decode_yolo_output(
            &tensor.data,
            tensor.num_channels,
            tensor.num_boxes,
            num_classes,
            self.descriptor.score_threshold,
        );
        let suppressed = yolo::nms_yolo_detections(&raw, self.descriptor.nms_threshold);

        let scale_x = image.width as f32 / in_w as f32;
        let scale_y = image.height as f32 / in_h as f32;
        result.detections.clear();
        yolo::fill_detection_result(&raw, &suppressed, scale_x, scale_y, result);

        if !self.labels.is_empty() {
            for idx in 0..result.detections.len() {
                let name = self.class_name(result.detections[idx].class_id);
                result.detections[idx].class_name = name;
            }
        }
        Ok(())
    }
}

impl<R: InferenceRuntime> DetectorBackend for YoloDetector<R> {
    fn descriptor(&self) -> &DetectorDescriptor {
        &self.descriptor
    }

    fn load(&mut self) -> PerceptionResult<()> {
        if self.loaded {
            return Ok(());
        }
        if self.descriptor.input_width == 0 || self.descriptor.input_height == 0 {
            return Err(PerceptionError::TensorShape(format!(
                "input size {}x{}",
                self.descriptor.input_width, self.descriptor.input_height
            )));
        }

        self.runtime.load(&self.descriptor)?;

        self.labels = match &self.descriptor.label_path {
            Some(path) => match load_labels(path) {
                Ok(labels) => labels,
                Err(e) => {
                    tracing::warn!("Failed to read labels {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        self.loaded = true;
        tracing::info!(
            "Loaded detector '{}' on {} ({}x{}, {} classes)",
            self.descriptor.detector_id,
            self.runtime.name(),
            self.descriptor.input_width,
            self.descriptor.input_height,
            self.descriptor.num_classes
        );
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn run(&mut self, image: &ImageView<'_>, result: &mut DetectionResult) -> PerceptionResult<()> {
        if !self.loaded {
            return Err(PerceptionError::NotLoaded);
        }

        let started = Instant::now();
        match self.detect(image, result) {
            Ok(()) => {
                let elapsed = started.elapsed().as_micros() as u64;
                self.stats.record_success(elapsed, result.detections.len());
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn unload(&mut self) {
        if self.loaded {
            self.runtime.unload();
            self.loaded = false;
            self.input = Vec::new();
            tracing::debug!("Unloaded detector '{}'", self.descriptor.detector_id);
        }
    }

    fn stats(&self) -> Option<&InferenceStats> {
        Some(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::runtimes::{ReplayRuntime, UnavailableRuntime};
    use crate::perception::types::{BackendType, BoundingBox, PixelFormat};
    use std::io::Write;

    fn descriptor() -> DetectorDescriptor {
        DetectorDescriptor::new("det", "replay", BackendType::GenericCpu)
            .with_input_size(100, 100)
            .with_num_classes(2)
    }

    /// One box centered at (50, 50), 20x20, strongly class 1.
    fn one_box() -> ReplayRuntime {
        ReplayRuntime::new(vec![50.0, 50.0, 20.0, 20.0, -5.0, 5.0], 6, 1)
    }

    #[test]
    fn test_run_before_load_fails() {
        let mut det = YoloDetector::new(descriptor(), one_box());
        let pixels = vec![0u8; 200 * 100 * 3];
        let image = ImageView::packed(&pixels, 200, 100, PixelFormat::Rgb8);
        let mut result = DetectionResult::default();
        assert!(matches!(det.run(&image, &mut result), Err(PerceptionError::NotLoaded)));
    }

    #[test]
    fn test_detect_rescales_to_source() {
        let mut det = YoloDetector::new(descriptor(), one_box());
        det.load().unwrap();
        det.load().unwrap();
        assert!(det.is_loaded());

        let pixels = vec![0u8; 200 * 50 * 3];
        let image = ImageView::packed(&pixels, 200, 50, PixelFormat::Bgr8);
        let mut result = DetectionResult::new("cam", 3, 99);
        det.run(&image, &mut result).unwrap();

        assert_eq!(result.frame_index, 3);
        assert_eq!(result.detections.len(), 1);
        let d = &result.detections[0];
        assert_eq!(d.class_id, 1);
        assert_eq!(d.bbox, BoundingBox::new(80.0, 20.0, 40.0, 10.0));
        assert_eq!(det.stats().map(|s| s.runs), Some(1));
    }

    #[test]
    fn test_invalid_image_rejected() {
        let mut det = YoloDetector::new(descriptor(), one_box());
        det.load().unwrap();
        let pixels = vec![0u8; 10];
        let image = ImageView::packed(&pixels, 20, 20, PixelFormat::Rgb8);
        let mut result = DetectionResult::default();
        assert!(matches!(
            det.run(&image, &mut result),
            Err(PerceptionError::InvalidImage(_))
        ));
        assert_eq!(det.stats().map(|s| s.failures), Some(1));
    }

    #[test]
    fn test_labels_fill_class_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "person\n\ncar").unwrap();

        let desc = descriptor().with_labels(file.path());
        let mut det = YoloDetector::new(desc, one_box());
        det.load().unwrap();
        assert_eq!(det.labels(), ["person", "car"]);

        let pixels = vec![0u8; 100 * 100 * 3];
        let image = ImageView::packed(&pixels, 100, 100, PixelFormat::Rgb8);
        let mut result = DetectionResult::default();
        det.run(&image, &mut result).unwrap();
        assert_eq!(result.detections[0].class_name.as_deref(), Some("car"));
    }

    #[test]
    fn test_unavailable_runtime_fails_load() {
        let mut det = YoloDetector::new(descriptor(), UnavailableRuntime::new(BackendType::Npu));
        assert!(matches!(det.load(), Err(PerceptionError::RuntimeUnavailable(_))));
        assert!(!det.is_loaded());
    }

    #[test]
    fn test_short_tensor_is_shape_error() {
        let runtime = ReplayRuntime::new(vec![1.0, 2.0], 6, 1);
        let mut det = YoloDetector::new(descriptor(), runtime);
        det.load().unwrap();
        let pixels = vec![0u8; 100 * 100 * 3];
        let image = ImageView::packed(&pixels, 100, 100, PixelFormat::Rgb8);
        let mut result = DetectionResult::default();
        assert!(matches!(
            det.run(&image, &mut result),
            Err(PerceptionError::TensorShape(_))
        ));
    }
}
