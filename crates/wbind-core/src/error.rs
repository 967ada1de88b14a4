use thiserror::Error;

use crate::node::{NodeId, NodeKind};

pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors raised by observable cells, the commit graph and path lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("re-entrant mutation of node {node} (drain depth {depth})")]
    ReentrantMutation { node: NodeId, depth: usize },

    #[error("commit graph was already detached")]
    DetachAfterDispose,

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("expected {expected} node, found {found}")]
    KindMismatch { expected: NodeKind, found: NodeKind },

    #[error("no node at path `{path}`")]
    PathNotFound { path: String },

    #[error("invalid value `{value}` for {key}")]
    InvalidConfig { key: String, value: String },
}

impl WatchError {
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }
}
