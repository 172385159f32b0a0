//! Persisted types for the keel state store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use keel_core::safe_concat_name;

/// One cluster member node record.
///
/// Machines are owned by the orchestration layer outside the planner;
/// the planner reads them and, during init-node election, patches the
/// init marker label and join-URL annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub name: String,
    /// Stable unique id, carried into every plan as a node label.
    pub uid: String,
    pub namespace: String,
    pub cluster_name: String,
    /// Role and init-node marker labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Join URL and JSON-encoded extra labels/taints.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Deletion intent, set by the external lifecycle owner.
    #[serde(default)]
    pub deleting: bool,
    #[serde(default)]
    pub status: MachineStatus,
}

/// Observed machine state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineStatus {
    #[serde(default)]
    pub conditions: Vec<MachineCondition>,
}

/// One machine status condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineCondition {
    pub condition_type: String,
    /// `"True"`, `"False"`, or `"Unknown"`.
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Machine {
    /// Build the composite key for the machines table.
    pub fn table_key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.cluster_name, self.name)
    }
}

/// Per-node plan record: the last-computed desired plan and the last
/// plan the node agent was confirmed to have applied.
///
/// `plan` is written only by the planner; `applied_checksum` only by the
/// node agent; `applied_plan` only by the promotion step. Keeping the
/// fields independent is what lets the two writers coexist.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanRecord {
    pub namespace: String,
    pub cluster_name: String,
    pub machine_name: String,
    /// Desired plan, serialized `NodePlan` bytes.
    #[serde(default)]
    pub plan: Option<Vec<u8>>,
    /// Last promoted applied plan bytes.
    #[serde(default)]
    pub applied_plan: Option<Vec<u8>>,
    /// sha256 hex the agent reported for the plan it applied.
    #[serde(default)]
    pub applied_checksum: Option<String>,
}

impl PlanRecord {
    /// Derived record name: `<machine>-machine-plan`, length-safe.
    pub fn record_name(machine_name: &str) -> String {
        safe_concat_name(&[machine_name, "machine", "plan"])
    }

    /// Build the composite key for the machine-plans table.
    pub fn table_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace,
            self.cluster_name,
            Self::record_name(&self.machine_name)
        )
    }

    /// Convergence flag: the applied plan byte-equals the desired plan.
    pub fn in_sync(&self) -> bool {
        match (&self.plan, &self.applied_plan) {
            (Some(plan), Some(applied)) => plan == applied,
            _ => false,
        }
    }
}

/// Cluster-agent registration token material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationToken {
    pub name: String,
    /// Management cluster the token registers against.
    pub cluster_name: String,
    pub token: String,
}

impl RegistrationToken {
    /// Build the composite key for the registration-tokens table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.cluster_name, self.name)
    }
}

/// Derived name of a cluster's state secret: `<cluster>-keel-state`.
pub fn state_secret_name(cluster_name: &str) -> String {
    safe_concat_name(&[cluster_name, "keel", "state"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_record_name_is_derived_from_machine() {
        assert_eq!(PlanRecord::record_name("node-1"), "node-1-machine-plan");
    }

    #[test]
    fn in_sync_requires_matching_bytes() {
        let mut record = PlanRecord {
            namespace: "fleet".to_string(),
            cluster_name: "prod".to_string(),
            machine_name: "node-1".to_string(),
            plan: Some(b"{\"a\":1}".to_vec()),
            applied_plan: None,
            applied_checksum: None,
        };
        assert!(!record.in_sync());

        record.applied_plan = Some(b"{\"a\":1}".to_vec());
        assert!(record.in_sync());

        record.applied_plan = Some(b"{\"a\":2}".to_vec());
        assert!(!record.in_sync());
    }

    #[test]
    fn state_secret_name_is_derived() {
        assert_eq!(state_secret_name("prod"), "prod-keel-state");
    }
}
