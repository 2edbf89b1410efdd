//! Model error types.

use thiserror::Error;

use crate::model::NodeKind;

/// Errors raised while building or decoding canvas model values.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Viewport violates `zoom > 0` or has non-finite components
    #[error("invalid viewport: {0}")]
    InvalidViewport(String),

    /// Node type tag is not one of the known kinds
    #[error("unknown node kind '{0}'")]
    UnknownNodeKind(String),

    /// Project id is not a UUID
    #[error("invalid project id '{0}'")]
    InvalidProjectId(String),

    /// State could not be encoded for hashing
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Node content does not match the schema of its kind
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: NodeKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ModelError {
    /// Create a Payload error.
    pub fn payload(kind: NodeKind, source: serde_json::Error) -> Self {
        Self::Payload { kind, source }
    }
}
