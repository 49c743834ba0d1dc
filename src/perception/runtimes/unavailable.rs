use crate::perception::backend::{InferenceRuntime, RawTensor};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::types::{BackendType, DetectorDescriptor};

/// Placeholder for a vendor runtime that is not compiled into this build.
///
/// `load` always fails, so detectors built on it are never handed out by
/// the plugin manager.
#[derive(Debug, Clone)]
pub struct UnavailableRuntime {
    backend: BackendType,
}

impl UnavailableRuntime {
    pub fn new(backend: BackendType) -> Self {
        Self { backend }
    }
}

impl InferenceRuntime for UnavailableRuntime {
    fn name(&self) -> &str {
        self.backend.key()
    }

    fn load(&mut self, descriptor: &DetectorDescriptor) -> PerceptionResult<()> {
        tracing::warn!(
            "Detector '{}' requests the {} runtime, which is not built in",
            descriptor.detector_id,
            self.backend
        );
        Err(PerceptionError::RuntimeUnavailable(self.backend.key().to_string()))
    }

    fn infer(&mut self, _input: &[f32], _width: u32, _height: u32) -> PerceptionResult<RawTensor> {
        Err(PerceptionError::NotLoaded)
    }

    fn unload(&mut self) {}
}
