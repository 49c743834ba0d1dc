#![cfg(feature = "backend-tract")]

use crate::perception::backend::{InferenceRuntime, RawTensor};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::DetectorDescriptor;
use tract_onnx::prelude::*;

/// ONNX inference on the CPU through tract.
pub struct TractRuntime {
    model: Option<SimplePlan<TypedFact, Box<dyn TypedOp>>>,
}

impl TractRuntime {
    pub fn new() -> Self {
        Self { model: None }
    }
}

impl Default for TractRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn inference_err(e: impl std::fmt::Display) -> PerceptionError {
    PerceptionError::Inference(e.to_string())
}

/// Normalize a `[1, C, N]` or `[1, N, C]` output into channel-major order.
fn to_channel_major(shape: &[usize], values: &[f32], min_channels: usize) -> PerceptionResult<RawTensor> {
    let dims: Vec<usize> = shape.iter().copied().filter(|&d| d != 1).collect();
    let (a, b) = match dims.as_slice() {
        [a, b] => (*a, *b),
        [n] if *n >= min_channels => (*n, 1),
        _ => return Err(PerceptionError::TensorShape(format!("{:?}", shape))),
    };

    // Channels are the smaller axis in every YOLO export.
    if a >= min_channels && (a <= b || b < min_channels) {
        return Ok(RawTensor::new(values.to_vec(), a, b));
    }
    if b < min_channels {
        return Err(PerceptionError::TensorShape(format!("{:?}", shape)));
    }

    let (num_boxes, num_channels) = (a, b);
    let mut data = vec![0.0; values.len()];
    for j in 0..num_boxes {
        for ch in 0..num_channels {
            data[ch * num_boxes + j] = values[j * num_channels + ch];
        }
    }
    Ok(RawTensor::new(data, num_channels, num_boxes))
}

impl InferenceRuntime for TractRuntime {
    fn name(&self) -> &str {
        "tract"
    }

    fn load(&mut self, descriptor: &DetectorDescriptor) -> PerceptionResult<()> {
        let path = &descriptor.model_path;
        if !path.exists() {
            return Err(PerceptionError::ModelNotFound(path.display().to_string()));
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(inference_err)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(
                        1,
                        3,
                        descriptor.input_height as usize,
                        descriptor.input_width as usize
                    ),
                ),
            )
            .map_err(inference_err)?
            .into_optimized()
            .map_err(inference_err)?
            .into_runnable()
            .map_err(inference_err)?;

        self.model = Some(model);
        Ok(())
    }

    fn infer(&mut self, input: &[f32], width: u32, height: u32) -> PerceptionResult<RawTensor> {
        let model = self.model.as_ref().ok_or(PerceptionError::NotLoaded)?;

        let tensor = tract_ndarray::Array4::from_shape_vec(
            (1, 3, height as usize, width as usize),
            input.to_vec(),
        )
        .map_err(inference_err)?
        .into_tensor();

        let outputs = model.run(tvec!(tensor.into())).map_err(inference_err)?;
        let output = outputs
            .first()
            .ok_or_else(|| PerceptionError::Inference("model produced no outputs".to_string()))?;
        let view = output.to_array_view::<f32>().map_err(inference_err)?;
        let values: Vec<f32> = view.iter().copied().collect();

        to_channel_major(view.shape(), &values, 5)
    }

    fn unload(&mut self) {
        self.model = None;
    }
}
