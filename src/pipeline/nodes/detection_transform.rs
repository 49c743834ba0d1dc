//! Detection transform: camera frames in, detection packets out.

use crate::perception::{DetectionResult, DetectorBackend};
use crate::pipeline::bus::category;
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, PadInbox};
use crate::pipeline::packet::{CameraFrame, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError};

pub const VIDEO_IN: &str = "video_in";
pub const DETECTION_OUT: &str = "detection_out";

/// Runs a detector on the most recent frame each tick.
///
/// The detector comes from the plugin manager (`detector_id` parameter) or
/// is injected with [`with_detector`](Self::with_detector). With neither,
/// or when the backend cannot load, the node still emits one empty result
/// per frame so downstream timing is preserved.
pub struct DetectionTransformNode {
    core: NodeCore,
    inbox: PadInbox,
    detector_id: Option<String>,
    detector: Option<Box<dyn DetectorBackend>>,
    injected: bool,
    frames: u64,
}

impl DetectionTransformNode {
    pub fn new(id: impl Into<String>) -> Self {
        let video_in = Pad::sink(VIDEO_IN, Caps::media(media::VIDEO_RAW));
        let inbox = PadInbox::attach(&video_in, 1);
        Self {
            core: NodeCore::new(id, templates::DETECTION_TRANSFORM)
                .with_pad(video_in)
                .with_pad(Pad::source(DETECTION_OUT, Caps::media(media::DETECTIONS))),
            inbox,
            detector_id: None,
            detector: None,
            injected: false,
            frames: 0,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn DetectorBackend>) -> Self {
        self.detector = Some(detector);
        self.injected = true;
        self
    }

    pub fn detector_id(&self) -> Option<&str> {
        self.detector_id.as_deref()
    }

    pub fn has_detector(&self) -> bool {
        self.detector.as_ref().is_some_and(|d| d.is_loaded())
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}

impl Node for DetectionTransformNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::Detection(p) => {
                self.detector_id = p.detector_id.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "detection_transform",
            }),
        }
    }

    fn on_start(&mut self, ctx: &mut NodeContext) -> PipelineResult<()> {
        if self.detector.is_none() {
            if let Some(detector_id) = &self.detector_id {
                self.detector = ctx.services.perception.create_detector(detector_id);
                if self.detector.is_none() {
                    ctx.post(
                        category::PERCEPTION,
                        format!(
                            "{}: detector '{}' unavailable, emitting empty results",
                            self.core.id(),
                            detector_id
                        ),
                    );
                }
            }
        }

        if let Some(detector) = self.detector.as_mut() {
            if let Err(e) = detector.load() {
                tracing::warn!("{}: detector failed to load: {}", self.core.id(), e);
                ctx.post(
                    category::PERCEPTION,
                    format!("{}: detector failed to load: {}", self.core.id(), e),
                );
                self.detector = None;
                self.injected = false;
            }
        }
        self.frames = 0;
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        let Some(bytes) = self.inbox.take_latest() else {
            return;
        };
        let frame = match CameraFrame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("{}: dropping frame: {}", self.core.id(), e);
                return;
            }
        };

        let mut result = DetectionResult::new(self.core.id(), frame.frame_index, frame.timestamp_ns);
        if let Some(detector) = self.detector.as_mut() {
            if let Err(e) = detector.run(&frame.view(), &mut result) {
                tracing::warn!("{}: detection failed on frame {}: {}", self.core.id(), frame.frame_index, e);
                result.detections.clear();
            }
        }
        self.frames += 1;
        self.core.push(DETECTION_OUT, &result.encode());
    }

    fn on_stop(&mut self, _ctx: &mut NodeContext) {
        if let Some(detector) = self.detector.as_mut() {
            detector.unload();
        }
        if !self.injected {
            self.detector = None;
        }
    }
}
