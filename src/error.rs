//! Error handling for falconflow
//!
//! Each subsystem has its own error enum (`PipelineError`, `FlowError`,
//! `PerceptionError`); this module wraps them into a single crate-level type
//! for callers that drive the whole runtime.

use crate::perception::PerceptionError;
use crate::pipeline::{FlowError, PipelineError};
use thiserror::Error;

/// Main error type for falconflow operations
#[derive(Error, Debug)]
pub enum FalconError {
    /// Graph construction or pad errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Flow definition or executor errors
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// Detector, tracker or packet errors
    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FalconError>,
    },
}

impl FalconError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FalconError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for falconflow operations
pub type Result<T> = std::result::Result<T, FalconError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FalconError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
