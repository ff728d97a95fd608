//! Error types for pipeline orchestration

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A maintenance run is already in flight
    #[error("Maintenance job '{0}' is already running")]
    MaintenanceBusy(String),

    /// Underlying graph failure
    #[error(transparent)]
    Graph(#[from] willow_graph::GraphError),

    /// Underlying version-control failure
    #[error(transparent)]
    Vcs(#[from] willow_vcs::VcsError),

    /// Agent plumbing failure (bus socket, scratch files)
    #[error(transparent)]
    Agent(#[from] willow_agent::AgentError),
}
