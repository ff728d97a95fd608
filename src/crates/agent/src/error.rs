//! Error types for agent spawning and the event bus
//!
//! Most failures here are absorbed by policy: a sub-agent that cannot
//! spawn, exits nonzero, or emits garbage resolves to an empty outcome.
//! The error type exists for the places that must report, like binding
//! the bus socket.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// The bus socket could not be bound or removed
    #[error("Event bus error: {0}")]
    Bus(String),

    /// IO error on scratch files or process pipes
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
