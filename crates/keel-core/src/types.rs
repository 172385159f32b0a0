//! Domain types for the keel provisioning model.
//!
//! A `Cluster` is the declarative provisioning target; a `NodePlan` is
//! the instruction/file payload computed for one member node. Plans are
//! compared for equality to detect drift, so every collection here that
//! ends up in a plan is ordered (`BTreeMap`, sorted `Vec`s).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::selector::LabelSelector;

/// A declarative cluster: the provisioning target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub namespace: String,
    /// Cluster-level labels, matched against config fragment selectors.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

/// Desired state of a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    /// Kubernetes version string, e.g. `"v1.27.4+skiff1"`. The bootstrap
    /// runtime flavor is derived from it.
    pub kubernetes_version: String,
    /// Name of the management cluster this cluster registers against.
    pub management_cluster: String,
    /// Ordered config fragments; the first whose selector matches the
    /// cluster labels supplies the base config document.
    #[serde(default)]
    pub config: Vec<SystemConfig>,
    #[serde(default)]
    pub upgrade_strategy: UpgradeStrategy,
}

/// One config fragment with an optional targeting selector.
///
/// A fragment without a selector matches nothing; a fragment meant for
/// every cluster carries an empty selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub machine_label_selector: Option<LabelSelector>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

/// Rolling-upgrade policy for a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpgradeStrategy {
    /// How many server (etcd/control-plane) nodes may be mid-rollout at
    /// once. 0 means unbounded.
    pub server_concurrency: u32,
    /// How many worker nodes may be mid-rollout at once. 0 means unbounded.
    pub worker_concurrency: u32,
    /// Whether server nodes should be drained before applying a plan.
    pub drain_servers: bool,
    /// Whether worker nodes should be drained before applying a plan.
    pub drain_workers: bool,
}

impl Default for UpgradeStrategy {
    fn default() -> Self {
        Self {
            server_concurrency: 1,
            worker_concurrency: 1,
            drain_servers: false,
            drain_workers: false,
        }
    }
}

/// Observed state of a cluster, stamped by the provisioning loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatus {
    pub ready: bool,
    #[serde(default)]
    pub message: String,
    /// Name of the per-cluster state secret (derived, set once known).
    #[serde(default)]
    pub state_secret_name: String,
}

impl Cluster {
    /// Build the composite key for the clusters table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Node plan ─────────────────────────────────────────────────────

/// The bootstrap payload computed for one node: ordered instructions
/// plus files to place on the host.
///
/// Two compilations from identical inputs must be byte-identical once
/// serialized — plan equality is the drift-detection mechanism.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodePlan {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub files: Vec<PlanFile>,
}

/// One command the node agent runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instruction {
    /// Image the instruction payload is extracted from.
    pub image: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=value` environment entries.
    #[serde(default)]
    pub env: Vec<String>,
}

/// One file the node agent writes before running instructions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanFile {
    /// Base64-encoded file content.
    pub content: String,
    /// Absolute target path on the node.
    pub path: String,
}

/// A node taint, decoded from the machine's taints annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: String,
}

impl Taint {
    /// Render as a `key=value:effect` config line.
    pub fn to_config_line(&self) -> String {
        format!("{}={}:{}", self.key, self.value, self.effect)
    }
}

/// Per-cluster shared secret material, generated once and reused for
/// every node of the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSecrets {
    pub server_token: String,
    pub agent_token: String,
}
