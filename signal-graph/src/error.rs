//! Error types for the signal graph.
//!
//! Only two kinds of failure are surfaced at runtime: a user compute function
//! that fails, and an access through a handle whose node has already been
//! disposed. Malformed ownership graphs are programming errors and are not
//! detected.

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error returned by fallible user compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A compute function returned an error. The batch that ran it is aborted.
    #[error("computation {node:?} failed: {source}")]
    Compute {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    #[error("node {0:?} has been disposed")]
    Disposed(NodeId),

    /// The handle's value type does not match what is stored in the node.
    /// Only reachable by pairing a handle with the wrong context.
    #[error("node {node:?} does not hold a value of type {expected}")]
    TypeMismatch {
        node: NodeId,
        expected: &'static str,
    },

    /// Effects kept writing signals that re-triggered effects.
    #[error("update depth exceeded: more than {limit} nested effect flushes")]
    UpdateDepthExceeded { limit: usize },
}

impl Error {
    pub(crate) fn type_mismatch<T>(node: NodeId) -> Self {
        Self::TypeMismatch {
            node,
            expected: std::any::type_name::<T>(),
        }
    }

    /// The node the error is about, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Compute { node, .. } | Self::TypeMismatch { node, .. } => Some(*node),
            Self::Disposed(node) => Some(*node),
            Self::UpdateDepthExceeded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn compute_error_keeps_source() {
        let node = NodeId::from(KeyData::from_ffi(1));
        let err = Error::Compute {
            node,
            source: "boom".into(),
        };

        assert_eq!(err.node(), Some(node));
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn depth_error_has_no_node() {
        let err = Error::UpdateDepthExceeded { limit: 3 };
        assert_eq!(err.node(), None);
        assert_eq!(
            err.to_string(),
            "update depth exceeded: more than 3 nested effect flushes"
        );
    }
}
