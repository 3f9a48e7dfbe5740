//! Error types for the pipeline runtime

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the pipeline runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid pipeline configuration (bad graph, missing/duplicate names, arity)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Node type not present in the registry
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node parameters rejected by the type's schema
    #[error("invalid parameters for node '{node}': {reason}")]
    InvalidParams {
        /// Node name the parameters were destined for
        node: String,
        /// Human-readable rejection reason
        reason: String,
    },

    /// Node execution failure surfaced from `process` or a lifecycle hook
    #[error("node execution failed: {0}")]
    NodeExecution(String),

    /// Reference-bound parameter could not be resolved
    #[error("reference resolution failed: {0}")]
    Reference(String),

    /// Pipeline id not known to the manager
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Bus codec failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
