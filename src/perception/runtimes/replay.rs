use crate::perception::backend::{InferenceRuntime, RawTensor};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::DetectorDescriptor;

/// Returns the same output tensor for every frame.
///
/// Used for pipeline bring-up without model hardware and in tests.
#[derive(Debug, Clone)]
pub struct ReplayRuntime {
    tensor: RawTensor,
    loaded: bool,
    calls: u64,
}

impl ReplayRuntime {
    pub fn new(data: Vec<f32>, num_channels: usize, num_boxes: usize) -> Self {
        Self {
            tensor: RawTensor::new(data, num_channels, num_boxes),
            loaded: false,
            calls: 0,
        }
    }

    /// A runtime that never reports any box.
    pub fn empty(num_classes: usize) -> Self {
        Self::new(Vec::new(), 4 + num_classes, 0)
    }

    /// Build from per-box rows `[cx, cy, w, h, logit0, logit1, ...]`.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let num_boxes = rows.len();
        let num_channels = rows.iter().map(Vec::len).max().unwrap_or(4);
        let mut data = vec![0.0; num_channels * num_boxes];
        for (j, row) in rows.iter().enumerate() {
            for (ch, v) in row.iter().enumerate() {
                data[ch * num_boxes + j] = *v;
            }
        }
        Self::new(data, num_channels, num_boxes)
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceRuntime for ReplayRuntime {
    fn name(&self) -> &str {
        "replay"
    }

    fn load(&mut self, _descriptor: &DetectorDescriptor) -> PerceptionResult<()> {
        self.loaded = true;
        Ok(())
    }

    fn infer(&mut self, input: &[f32], width: u32, height: u32) -> PerceptionResult<RawTensor> {
        if !self.loaded {
            return Err(PerceptionError::NotLoaded);
        }
        let expected = width as usize * height as usize * 3;
        if input.len() != expected {
            return Err(PerceptionError::Inference(format!(
                "input has {} values, expected {}",
                input.len(),
                expected
            )));
        }
        self.calls += 1;
        Ok(self.tensor.clone())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }
}
