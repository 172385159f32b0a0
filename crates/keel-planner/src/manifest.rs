//! The cluster-agent manifest seam.
//!
//! Control-plane plans embed a cluster-agent manifest fetched from the
//! management server. The fetch is the planner's only remote
//! collaborator, so it sits behind an object-safe trait; keel-agent
//! provides the HTTPS implementation and tests substitute a stub.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use keel_core::Cluster;

/// Boxed future returned by `ManifestSource` implementations.
pub type ManifestFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, ManifestError>> + Send + 'a>>;

/// Supplies the cluster-agent manifest for a cluster.
pub trait ManifestSource: Send + Sync {
    /// Fetch the cluster-agent manifest bytes for `cluster`.
    ///
    /// Cancellation propagates from the caller: dropping the returned
    /// future must abort the fetch.
    fn cluster_agent<'a>(&'a self, cluster: &'a Cluster) -> ManifestFuture<'a>;
}

/// Errors from fetching the cluster-agent manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no registration token for management cluster {0}")]
    NoRegistrationToken(String),

    #[error("management server CA bundle is empty")]
    MissingCa,

    #[error("manifest fetch failed: {0}")]
    Fetch(String),
}
