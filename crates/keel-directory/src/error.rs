//! Error types for the node directory.

use thiserror::Error;

use keel_state::StateError;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur at the directory boundary.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("malformed labels annotation on machine {machine}: {source}")]
    MalformedLabels {
        machine: String,
        source: serde_json::Error,
    },

    #[error("malformed taints annotation on machine {machine}: {source}")]
    MalformedTaints {
        machine: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),
}
