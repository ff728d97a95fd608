//! Error types for the stream layer

use thiserror::Error;

/// Result type alias for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for stream operations
#[derive(Debug, Error)]
pub enum StreamError {
    /// No active stream exists for the conversation
    #[error("No active stream for conversation '{0}'")]
    NoActiveStream(String),

    /// The persistence sink failed while finalizing a stream
    #[error("Persistence failed: {0}")]
    Persist(String),
}
