//! Perception-specific error types.

use thiserror::Error;

/// Errors from detector backends, trackers and the plugin manager.
#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Backend is not loaded")]
    NotLoaded,

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("{0} runtime is not available in this build")]
    RuntimeUnavailable(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected output tensor shape: {0}")]
    TensorShape(String),

    #[error("Unknown detector '{0}'")]
    UnknownDetector(String),

    #[error("Detector '{0}' is already registered")]
    DuplicateDetector(String),

    #[error("No backend registered for key '{0}'")]
    UnknownBackend(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Malformed packet: {0}")]
    Packet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PerceptionResult<T> = std::result::Result<T, PerceptionError>;
