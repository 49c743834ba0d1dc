//! Tracking transform: detection packets in, tracking packets out.

use crate::perception::{DetectionResult, TrackerBackend, TrackerConfig, TrackingResult};
use crate::pipeline::bus::category;
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, PadInbox};
use crate::pipeline::packet::WirePacket;
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError, TrackingParams};

pub const DETECTION_IN: &str = "detection_in";
pub const TRACKING_OUT: &str = "tracking_out";

/// Detection packets buffered between ticks.
const INBOX_CAPACITY: usize = 8;

pub struct TrackingTransformNode {
    core: NodeCore,
    inbox: PadInbox,
    params: TrackingParams,
    tracker: Option<Box<dyn TrackerBackend>>,
    injected: bool,
}

impl TrackingTransformNode {
    pub fn new(id: impl Into<String>) -> Self {
        let detection_in = Pad::sink(DETECTION_IN, Caps::media(media::DETECTIONS));
        let inbox = PadInbox::attach(&detection_in, INBOX_CAPACITY);
        Self {
            core: NodeCore::new(id, templates::TRACKING_TRANSFORM)
                .with_pad(detection_in)
                .with_pad(Pad::source(TRACKING_OUT, Caps::media(media::TRACKS))),
            inbox,
            params: TrackingParams::default(),
            tracker: None,
            injected: false,
        }
    }

    pub fn with_tracker(mut self, tracker: Box<dyn TrackerBackend>) -> Self {
        self.tracker = Some(tracker);
        self.injected = true;
        self
    }

    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            iou_threshold: self.params.iou_threshold,
            max_missed_frames: self.params.max_missed_frames,
            max_trajectory_points: self.params.max_trajectory_points,
        }
    }

    fn track(&mut self, bytes: &[u8]) -> Option<TrackingResult> {
        let tracker = self.tracker.as_mut()?;
        let mut detections = match DetectionResult::decode(bytes) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{}: dropping detection packet: {}", self.core.id(), e);
                return None;
            }
        };
        let mut tracking = TrackingResult::default();
        match tracker.run(&mut detections, &mut tracking) {
            Ok(()) => Some(tracking),
            Err(e) => {
                tracing::warn!("{}: tracker failed: {}", self.core.id(), e);
                None
            }
        }
    }
}

impl Node for TrackingTransformNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::Tracking(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "tracking_transform",
            }),
        }
    }

    fn on_start(&mut self, ctx: &mut NodeContext) -> PipelineResult<()> {
        if self.injected {
            if let Some(tracker) = self.tracker.as_mut() {
                if !tracker.is_loaded() {
                    tracker.load().map_err(|e| PipelineError::Node {
                        node_id: self.core.id().to_string(),
                        message: e.to_string(),
                    })?;
                }
            }
            return Ok(());
        }

        let config = self.tracker_config();
        self.tracker = ctx
            .services
            .perception
            .create_tracker(&self.params.tracker, &config);
        if self.tracker.is_none() {
            ctx.post(
                category::CONFIG,
                format!(
                    "{}: unknown tracker '{}', no tracks will be emitted",
                    self.core.id(),
                    self.params.tracker
                ),
            );
        } else {
            tracing::info!(
                "{}: tracking with '{}' (iou > {}, max missed {})",
                self.core.id(),
                self.params.tracker,
                config.iou_threshold,
                config.max_missed_frames
            );
        }
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        for bytes in self.inbox.drain() {
            if let Some(tracking) = self.track(&bytes) {
                self.core.push(TRACKING_OUT, &tracking.encode());
            }
        }
    }

    fn on_stop(&mut self, _ctx: &mut NodeContext) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.unload();
        }
        if !self.injected {
            self.tracker = None;
        }
    }
}
