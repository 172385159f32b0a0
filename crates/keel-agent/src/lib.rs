//! keel-agent — the cluster-agent manifest fetch collaborator.
//!
//! Control-plane node plans embed a cluster-agent manifest served by
//! the management server. This crate implements the planner's
//! `ManifestSource` seam: it resolves the cluster's registration token
//! from the state store and performs an HTTPS GET against
//! `/v3/import/{token}_{cluster}.yaml`, trusting only the CA bundle
//! from settings — never the system trust store.

pub mod http;
pub mod manifest;

pub use manifest::AgentManifestClient;
