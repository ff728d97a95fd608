//! Error types for version-control operations

use thiserror::Error;

/// Result type alias for version-control operations
pub type Result<T> = std::result::Result<T, VcsError>;

/// Main error type for version-control operations
#[derive(Debug, Error)]
pub enum VcsError {
    /// The repository has not been initialised yet
    #[error("Version control not initialised; call init() first")]
    NotInitialized,

    /// Branch lookup failed
    #[error("Branch '{0}' not found")]
    BranchNotFound(String),

    /// Branch already exists
    #[error("Branch '{0}' already exists")]
    BranchExists(String),

    /// The current branch cannot be deleted
    #[error("Cannot delete the current branch '{0}'")]
    DeleteCurrentBranch(String),

    /// Merge would touch overlapping nodes or links
    #[error("Merge of branch '{branch}' conflicts with the current branch")]
    MergeConflict { branch: String },

    /// A commit referenced by the refs file is missing or unreadable.
    /// This is fatal: mutation refuses until the operator repairs it.
    #[error("Commit '{0}' missing or unreadable")]
    MissingCommit(String),

    /// Refs metadata unreadable; same fatal treatment as a missing commit
    #[error("VCS metadata corrupt: {0}")]
    CorruptMetadata(String),

    /// Underlying graph/snapshot failure
    #[error(transparent)]
    Graph(#[from] willow_graph::GraphError),

    /// IO error on refs or commit files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
