//! Pipeline-specific error types.

use thiserror::Error;

/// Errors raised while building or mutating a pipeline graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Node '{0}' already exists in the pipeline")]
    DuplicateNode(String),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Node '{node}' has no pad named '{pad}'")]
    UnknownPad { node: String, pad: String },

    #[error("Pad '{node}.{pad}' is not a {expected} pad")]
    DirectionMismatch {
        node: String,
        pad: String,
        expected: &'static str,
    },

    #[error("Sink pad '{node}.{pad}' already has an upstream link")]
    SinkAlreadyLinked { node: String, pad: String },

    #[error("Caps mismatch: {0}")]
    CapsMismatch(String),

    #[error("No link {0}")]
    LinkNotFound(String),

    #[error("Node '{node_id}' error: {message}")]
    Node { node_id: String, message: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the flow loader and executor.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Malformed flow definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Flow definition is missing 'flow_id'")]
    MissingFlowId,

    #[error("No flow definition loaded")]
    NoDefinition,

    #[error("Unknown template '{template_id}' for node '{node_id}'")]
    UnknownTemplate {
        node_id: String,
        template_id: String,
    },

    #[error("Edge '{edge_id}' rejected: {source}")]
    Link {
        edge_id: String,
        #[source]
        source: PipelineError,
    },

    #[error(transparent)]
    Graph(#[from] PipelineError),

    #[error("Flow is already running")]
    AlreadyRunning,

    #[error("Flow is not running")]
    NotRunning,

    #[error("Failed to spawn driver thread: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
