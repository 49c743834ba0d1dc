//! Low-light enhancement transform.
//!
//! Frames whose sampled mean luminance falls under `brightness_threshold`
//! get a gamma lift; every frame is forwarded either way.

use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, PadInbox};
use crate::pipeline::packet::{CameraFrame, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{LowLightParams, NodeParams, ParamError};

pub const IMAGE_IN: &str = "image_in";
pub const IMAGE_OUT: &str = "image_out";

/// Pixel stride used when estimating brightness.
const SAMPLE_STEP: usize = 4;

/// Mean luma of `frame`, sampling every `SAMPLE_STEP`th pixel in both axes.
pub fn mean_luminance(frame: &CameraFrame) -> f32 {
    let (r_w, b_w) = if frame.format.is_bgr() {
        (0.114, 0.299)
    } else {
        (0.299, 0.114)
    };
    let bpp = frame.format.bytes_per_pixel();
    let stride = frame.stride as usize;

    let mut sum = 0.0f64;
    let mut samples = 0u64;
    for y in (0..frame.height as usize).step_by(SAMPLE_STEP) {
        let row = y * stride;
        for x in (0..frame.width as usize).step_by(SAMPLE_STEP) {
            let i = row + x * bpp;
            let Some(px) = frame.pixels.get(i..i + 3) else {
                continue;
            };
            sum += r_w * px[0] as f64 + 0.587 * px[1] as f64 + b_w * px[2] as f64;
            samples += 1;
        }
    }
    if samples == 0 {
        0.0
    } else {
        (sum / samples as f64) as f32
    }
}

/// Lookup table for `255 * (v / 255)^(1 / gamma)`.
pub fn gamma_table(gamma: f32) -> [u8; 256] {
    let inv = 1.0 / gamma as f64;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let mapped = 255.0 * (v as f64 / 255.0).powf(inv) + 0.5;
        *out = mapped.clamp(0.0, 255.0) as u8;
    }
    lut
}

pub struct LowLightAdaptationNode {
    core: NodeCore,
    inbox: PadInbox,
    params: LowLightParams,
    lut: [u8; 256],
    enhanced: u64,
}

impl LowLightAdaptationNode {
    pub fn new(id: impl Into<String>) -> Self {
        let image_in = Pad::sink(IMAGE_IN, Caps::media(media::VIDEO_RAW));
        let inbox = PadInbox::attach(&image_in, 1);
        let params = LowLightParams::default();
        Self {
            core: NodeCore::new(id, templates::LOW_LIGHT_ADAPTATION)
                .with_pad(image_in)
                .with_pad(Pad::source(IMAGE_OUT, Caps::media(media::VIDEO_RAW))),
            inbox,
            lut: gamma_table(params.gamma),
            params,
            enhanced: 0,
        }
    }

    pub fn params(&self) -> &LowLightParams {
        &self.params
    }

    /// Frames that were gamma corrected since start.
    pub fn frames_enhanced(&self) -> u64 {
        self.enhanced
    }

    /// Apply the gamma table in place if the frame is dark. Returns whether
    /// it was modified.
    pub fn enhance(&self, frame: &mut CameraFrame) -> bool {
        let mean = mean_luminance(frame);
        if mean >= self.params.brightness_threshold as f32 {
            return false;
        }
        let row_bytes = frame.width as usize * frame.format.bytes_per_pixel();
        let stride = frame.stride as usize;
        for row in frame.pixels.chunks_mut(stride.max(1)) {
            let used = row_bytes.min(row.len());
            for v in &mut row[..used] {
                *v = self.lut[*v as usize];
            }
        }
        true
    }
}

impl Node for LowLightAdaptationNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::LowLight(p) => {
                self.params = p.clone();
                self.lut = gamma_table(p.gamma);
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "low_light_adaptation",
            }),
        }
    }

    fn on_start(&mut self, _ctx: &mut NodeContext) -> PipelineResult<()> {
        self.enhanced = 0;
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        let Some(bytes) = self.inbox.take_latest() else {
            return;
        };
        let mut frame = match CameraFrame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("{}: dropping frame: {}", self.core.id(), e);
                return;
            }
        };
        if self.enhance(&mut frame) {
            self.enhanced += 1;
            self.core.push(IMAGE_OUT, &frame.encode());
        } else {
            self.core.push(IMAGE_OUT, &bytes);
        }
    }
}
