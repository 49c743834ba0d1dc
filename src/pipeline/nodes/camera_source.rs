//! Camera source node.
//!
//! Emits one [`CameraFrame`] per tick on `video_out`. Real capture drivers
//! implement [`FrameSource`] and are injected with
//! [`CameraSourceNode::with_source`]; without one the node renders a test
//! pattern from its parameters.

use crate::perception::PixelFormat;
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore};
use crate::pipeline::packet::{CameraFrame, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{CameraSourceParams, NodeParams, ParamError, TestPattern};

pub const VIDEO_OUT: &str = "video_out";

/// Producer of raw frames.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    /// Next frame, or `None` when nothing is ready this tick.
    fn next_frame(&mut self, frame_index: u32, timestamp_ns: u64) -> Option<CameraFrame>;

    fn close(&mut self) {}
}

/// Synthetic frames for bring-up without a camera.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    pattern: TestPattern,
    brightness: u8,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, format: PixelFormat, pattern: TestPattern, brightness: u8) -> Self {
        Self {
            width,
            height,
            format,
            pattern,
            brightness,
        }
    }

    pub fn from_params(params: &CameraSourceParams) -> Self {
        Self::new(
            params.width,
            params.height,
            PixelFormat::parse(&params.format).unwrap_or_default(),
            params.pattern,
            params.brightness,
        )
    }

    fn pixel(&self, x: u32, y: u32, frame_index: u32) -> [u8; 3] {
        let b = self.brightness;
        match self.pattern {
            TestPattern::Solid => [b, b, b],
            TestPattern::Gradient => {
                // Scrolls one pixel per frame.
                let xs = (x + frame_index) % self.width;
                let r = (xs * 255 / self.width.max(1)) as u8;
                let g = (y * 255 / self.height.max(1)) as u8;
                [r, g, b]
            }
            TestPattern::Checker => {
                if ((x / 32) + (y / 32)) % 2 == 0 {
                    [b, b, b]
                } else {
                    let inv = 255 - b;
                    [inv, inv, inv]
                }
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        "test_pattern"
    }

    fn next_frame(&mut self, frame_index: u32, timestamp_ns: u64) -> Option<CameraFrame> {
        let stride = self.width * 3;
        let mut pixels = Vec::with_capacity(stride as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let [r, g, b] = self.pixel(x, y, frame_index);
                if self.format.is_bgr() {
                    pixels.extend_from_slice(&[b, g, r]);
                } else {
                    pixels.extend_from_slice(&[r, g, b]);
                }
            }
        }
        Some(CameraFrame {
            width: self.width,
            height: self.height,
            stride,
            format: self.format,
            frame_index,
            timestamp_ns,
            pixels,
        })
    }
}

pub struct CameraSourceNode {
    core: NodeCore,
    params: CameraSourceParams,
    source: Option<Box<dyn FrameSource>>,
    injected: bool,
    frame_index: u32,
}

impl CameraSourceNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(id, templates::CAMERA_SOURCE)
                .with_pad(Pad::source(VIDEO_OUT, Caps::media(media::VIDEO_RAW))),
            params: CameraSourceParams::default(),
            source: None,
            injected: false,
            frame_index: 0,
        }
    }

    /// Use a capture driver instead of the test pattern.
    pub fn with_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self.injected = true;
        self
    }

    pub fn params(&self) -> &CameraSourceParams {
        &self.params
    }

    pub fn frames_emitted(&self) -> u32 {
        self.frame_index
    }
}

impl Node for CameraSourceNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::CameraSource(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "camera_source",
            }),
        }
    }

    fn on_start(&mut self, _ctx: &mut NodeContext) -> PipelineResult<()> {
        if !self.injected {
            self.source = Some(Box::new(TestPatternSource::from_params(&self.params)));
        }
        let id = self.core.id().to_string();
        let source = self.source.as_mut().ok_or_else(|| PipelineError::Node {
            node_id: id.clone(),
            message: "no frame source".to_string(),
        })?;
        source.open()?;
        tracing::info!(
            "Camera '{}' streaming from {} ({}x{} {})",
            id,
            source.name(),
            self.params.width,
            self.params.height,
            self.params.format
        );
        self.frame_index = 0;
        Ok(())
    }

    fn on_process(&mut self, ctx: &mut NodeContext) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        let timestamp_ns = ctx.timestamp.as_nanos() as u64;
        if let Some(frame) = source.next_frame(self.frame_index, timestamp_ns) {
            self.frame_index = self.frame_index.wrapping_add(1);
            self.core.push(VIDEO_OUT, &frame.encode());
        }
    }

    fn on_stop(&mut self, _ctx: &mut NodeContext) {
        if let Some(source) = self.source.as_mut() {
            source.close();
        }
        if !self.injected {
            self.source = None;
        }
    }
}
