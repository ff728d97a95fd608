//! Error types for graph operations
//!
//! Provides a unified error type covering validation, not-found, invariant,
//! and snapshot I/O failures. Validation and invariant errors are rejected
//! at the boundary and never leave partial state behind.

use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Main error type for graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    /// Node lookup failed
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// Parent node for a create operation does not exist
    #[error("Parent node '{0}' not found")]
    ParentNotFound(String),

    /// Link lookup failed
    #[error("Link '{0}' not found")]
    LinkNotFound(String),

    /// The root node cannot be deleted
    #[error("The root node cannot be deleted")]
    RootDeletion,

    /// A link must connect two distinct nodes
    #[error("A link cannot point from a node to itself")]
    SelfLink,

    /// An identical link (same endpoints and relation) already exists
    #[error("Link from '{from}' to '{to}' with relation '{relation}' already exists")]
    DuplicateLink {
        from: String,
        to: String,
        relation: String,
    },

    /// Node type string outside the six-element set
    #[error("Invalid node type '{0}'")]
    InvalidNodeType(String),

    /// Link relation outside the canonical set
    #[error("Invalid link relation '{0}'")]
    InvalidRelation(String),

    /// Temporal range with `valid_from` after `valid_until`
    #[error("Temporal range inverted: valid_from '{from}' is after valid_until '{until}'")]
    TemporalOrder { from: String, until: String },

    /// Snapshot file exists but cannot be interpreted as a graph
    #[error("Snapshot at '{path}' is corrupt: {reason}")]
    CorruptSnapshot { path: String, reason: String },

    /// IO error reading or writing the snapshot
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether this error is a caller mistake (validation / not-found)
    /// rather than an engine failure. Caller mistakes are surfaced to the
    /// tool layer with `isError` and never retried.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            GraphError::CorruptSnapshot { .. } | GraphError::Io(_) | GraphError::Serde(_)
        )
    }
}
