//! `ManifestSource` implementation backed by the management server.

use std::time::Duration;

use tracing::debug;

use keel_core::{Cluster, Settings};
use keel_planner::{ManifestError, ManifestFuture, ManifestSource};
use keel_state::StateStore;

use crate::http::https_get;

/// Fetches cluster-agent manifests from the management server.
///
/// The registration token is looked up in the state store by management
/// cluster name (first token in name order wins); TLS trust comes from
/// the settings CA bundle.
pub struct AgentManifestClient {
    settings: Settings,
    state: StateStore,
    timeout: Duration,
}

impl AgentManifestClient {
    /// Create a new manifest client.
    pub fn new(settings: Settings, state: StateStore) -> Self {
        Self {
            settings,
            state,
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the per-fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ManifestSource for AgentManifestClient {
    fn cluster_agent<'a>(&'a self, cluster: &'a Cluster) -> ManifestFuture<'a> {
        Box::pin(async move {
            let management = &cluster.spec.management_cluster;

            let token = self
                .state
                .first_registration_token(management)
                .map_err(|e| ManifestError::Fetch(e.to_string()))?
                .ok_or_else(|| ManifestError::NoRegistrationToken(management.clone()))?;

            let ca = self.settings.server.ca_certs.trim();
            if ca.is_empty() {
                return Err(ManifestError::MissingCa);
            }

            let path = format!("/v3/import/{}_{}.yaml", token.token, management);
            debug!(cluster = %cluster.name, %path, "fetching cluster-agent manifest");

            https_get(&self.settings.server.url, &path, ca, self.timeout)
                .await
                .map_err(|e| ManifestError::Fetch(e.to_string()))
        })
    }
}
