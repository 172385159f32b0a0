//! Error types for the provisioning planner.

use thiserror::Error;

use keel_core::SelectorError;
use keel_directory::DirectoryError;
use keel_state::StateError;

use crate::manifest::ManifestError;

/// Result type alias for planner operations.
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Hard failures that abort a provisioning pass.
///
/// Expected transient states (nodes out of sync, empty tiers, pending
/// election) are not errors — they surface as `Outcome::Waiting`.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("plan serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
