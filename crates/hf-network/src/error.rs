//! Network-specific error types.

use hf_core::{HfError, NodeId};
use thiserror::Error;

use crate::node::NodeKind;

/// Result type for network construction and mutation.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors raised while building, wiring or editing a network.
///
/// Threshold violations and ambiguous deletions are not errors: the former
/// go to the observer, the latter come back as `Ok(false)`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    /// Another element already uses this name.
    #[error("Element '{name}' already exists")]
    DuplicateName { name: String },

    /// No element with this name.
    #[error("No element named '{name}'")]
    UnknownElement { name: String },

    /// Handle does not refer to a live element (deleted or foreign).
    #[error("Node {id} is not part of this network")]
    UnknownNode { id: NodeId },

    /// The operation has no meaning for this variant.
    #[error("{what} is not supported by a {kind}")]
    Unsupported { kind: NodeKind, what: &'static str },

    /// Output index past the element's arity.
    #[error("Output {index} of '{name}' is out of range (arity {arity})")]
    OutputOutOfRange {
        name: String,
        index: usize,
        arity: usize,
    },

    /// Proportion vector length differs from the multisplit arity.
    #[error("'{name}' expects {expected} proportions, got {got}")]
    ProportionCount {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Builder branch navigation misuse.
    #[error("Builder navigation: {what}")]
    Navigation { what: &'static str },

    /// Topology validation failure.
    #[error("Topology error: {what}")]
    Topology { what: String },

    #[error(transparent)]
    Core(#[from] HfError),
}

impl From<NetworkError> for HfError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Core(inner) => inner,
            NetworkError::Topology { what } => HfError::Invariant { what },
            other => HfError::InvalidArg {
                what: other.to_string(),
            },
        }
    }
}
