//! Audio graph error types

use thiserror::Error;

use crate::media::ElementId;
use crate::node::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A source node already wraps this media element. The platform never
    /// allows a second one, in any context.
    #[error("Media element {element} is already connected to a source node")]
    AlreadyConnected { element: ElementId },

    #[error("Audio graph not supported: {0}")]
    Unsupported(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Context resume rejected: {0}")]
    ResumeRejected(String),

    #[error("Connecting {from} -> {to} closes a cycle with no delay node")]
    CycleWithoutDelay { from: NodeId, to: NodeId },

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} has no inputs")]
    NoInputs(NodeId),

    #[error("Node {0} has no outputs")]
    NoOutputs(NodeId),

    #[error("Node {0} belongs to a closed context")]
    NodeDetached(NodeId),

    #[error("Stream capture not supported by element {0}")]
    CaptureUnsupported(ElementId),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

impl GraphError {
    /// The platform's "already connected" rejection for a second source on
    /// the same element
    #[inline]
    pub fn is_duplicate_source(&self) -> bool {
        matches!(self, GraphError::AlreadyConnected { .. })
    }
}

impl From<bw_core::CoreError> for GraphError {
    fn from(err: bw_core::CoreError) -> Self {
        GraphError::InvalidParam(err.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
