//! Live component errors
//!
//! None of these reach the host as a failure. Components absorb them and
//! report them through status values and the log.

use bw_engine::{ElementId, GraphError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiveError {
    #[error("media element not found after {attempts} attempts")]
    AttachmentTimeout { attempts: u32 },

    #[error("a source node already wraps {0}")]
    DuplicateSource(ElementId),

    #[error("cannot connect to {0}")]
    ConnectionImpossible(ElementId),

    #[error("audio graph unsupported: {0}")]
    UnsupportedPlatform(String),

    #[error("meter frame failed: {0}")]
    TransientFrame(String),

    #[error("graph construction after teardown")]
    GraphConstructionRace,

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl LiveError {
    /// Terminal for the attachment engine
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            LiveError::DuplicateSource(_)
                | LiveError::TransientFrame(_)
                | LiveError::GraphConstructionRace
        )
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
