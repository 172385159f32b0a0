//! Bootstrap runtime flavor detection.
//!
//! Keel provisions two bootstrap distributions. Which one a cluster runs
//! is encoded in its kubernetes version string (`"v1.27.4+skiff1"` vs.
//! `"v1.27.4+clipper2"`), and everything path- or image-shaped hangs off
//! that flavor.

use serde::{Deserialize, Serialize};

/// A bootstrap runtime distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// First-generation single-binary runtime. The init node bootstraps
    /// a new cluster with `cluster-init: true`.
    Skiff,
    /// Second-generation runtime. Cluster initialization is implicit on
    /// the first server; no `cluster-init` flag exists.
    Clipper,
}

impl Runtime {
    /// Derive the runtime flavor from a cluster's kubernetes version.
    pub fn from_version(kubernetes_version: &str) -> Self {
        if kubernetes_version.contains("skiff") {
            Runtime::Skiff
        } else {
            Runtime::Clipper
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Skiff => "skiff",
            Runtime::Clipper => "clipper",
        }
    }

    /// Path of the runtime config document written by every plan.
    pub fn config_path(&self) -> String {
        format!("/etc/keel/{}/config.yaml", self.as_str())
    }

    /// Path where control-plane nodes receive the cluster-agent manifest.
    pub fn cluster_agent_manifest_path(&self) -> String {
        format!(
            "/var/lib/keel/{}/server/manifests/cluster-agent.yaml",
            self.as_str()
        )
    }

    /// Environment entry that switches the installer into agent mode.
    pub fn agent_mode_env(&self) -> String {
        format!("INSTALL_{}_TYPE=agent", self.as_str().to_uppercase())
    }

    /// Installer image reference for this runtime at the given version.
    ///
    /// `+` is not a valid tag character, so the version is mangled the
    /// same way image publishers mangle it.
    pub fn installer_image(&self, image_base: &str, kubernetes_version: &str) -> String {
        format!(
            "{}{}:{}",
            image_base,
            self.as_str(),
            kubernetes_version.replace('+', "-")
        )
    }
}
