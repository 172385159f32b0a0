//! NodeDirectory — store-backed access to cluster member machines.
//!
//! The planner reads members through this type and performs exactly two
//! kinds of writes: patching the init-node marker during election, and
//! stamping status conditions. Both are compare-before-write so a
//! repeated pass with unchanged inputs performs no writes.

use tracing::{debug, info};

use keel_state::{Machine, MachineCondition, StateStore};

use crate::error::DirectoryResult;
use crate::labels::INIT_NODE_LABEL;

/// Store-backed directory of cluster member machines.
#[derive(Clone)]
pub struct NodeDirectory {
    state: StateStore,
}

impl NodeDirectory {
    /// Create a new directory over the given store.
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// List the member machines of a cluster, in name order.
    pub fn list_members(&self, namespace: &str, cluster: &str) -> DirectoryResult<Vec<Machine>> {
        Ok(self.state.list_machines(namespace, cluster)?)
    }

    /// Mark a machine as the cluster's init node.
    ///
    /// A no-op if the marker is already set. Returns the (possibly
    /// updated) machine.
    pub fn set_init_mark(&self, machine: &Machine) -> DirectoryResult<Machine> {
        if machine.labels.get(INIT_NODE_LABEL).map(String::as_str) == Some("true") {
            return Ok(machine.clone());
        }
        let mut updated = machine.clone();
        updated
            .labels
            .insert(INIT_NODE_LABEL.to_string(), "true".to_string());
        self.state.put_machine(&updated)?;
        info!(machine = %updated.name, cluster = %updated.cluster_name, "init node marked");
        Ok(updated)
    }

    /// Clear a machine's init-node marker. A no-op if it isn't set.
    /// Returns the (possibly updated) machine.
    pub fn clear_init_mark(&self, machine: &Machine) -> DirectoryResult<Machine> {
        if !machine.labels.contains_key(INIT_NODE_LABEL) {
            return Ok(machine.clone());
        }
        let mut updated = machine.clone();
        updated.labels.remove(INIT_NODE_LABEL);
        self.state.put_machine(&updated)?;
        info!(machine = %updated.name, cluster = %updated.cluster_name, "init node mark cleared");
        Ok(updated)
    }

    /// Set (or replace) one status condition on a machine, skipping the
    /// write when the stored condition already matches.
    pub fn update_condition(
        &self,
        machine: &Machine,
        condition: MachineCondition,
    ) -> DirectoryResult<()> {
        let existing = machine
            .status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition.condition_type);
        if existing == Some(&condition) {
            return Ok(());
        }

        let mut updated = machine.clone();
        updated
            .status
            .conditions
            .retain(|c| c.condition_type != condition.condition_type);
        debug!(
            machine = %updated.name,
            condition = %condition.condition_type,
            status = %condition.status,
            "condition updated"
        );
        updated.status.conditions.push(condition);
        self.state.put_machine(&updated)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_state::MachineStatus;
    use std::collections::HashMap;

    fn directory() -> (NodeDirectory, StateStore) {
        let state = StateStore::open_in_memory().unwrap();
        (NodeDirectory::new(state.clone()), state)
    }

    fn test_machine(name: &str) -> Machine {
        Machine {
            name: name.to_string(),
            uid: format!("uid-{name}"),
            namespace: "fleet".to_string(),
            cluster_name: "prod".to_string(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            deleting: false,
            status: MachineStatus::default(),
        }
    }

    #[test]
    fn list_members_in_name_order() {
        let (dir, state) = directory();
        state.put_machine(&test_machine("node-b")).unwrap();
        state.put_machine(&test_machine("node-a")).unwrap();

        let members = dir.list_members("fleet", "prod").unwrap();
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["node-a", "node-b"]);
    }

    #[test]
    fn init_mark_set_and_clear_roundtrip() {
        let (dir, state) = directory();
        let machine = test_machine("node-a");
        state.put_machine(&machine).unwrap();

        let marked = dir.set_init_mark(&machine).unwrap();
        assert_eq!(marked.labels.get(INIT_NODE_LABEL).unwrap(), "true");

        let stored = state.get_machine("fleet", "prod", "node-a").unwrap().unwrap();
        assert_eq!(stored.labels.get(INIT_NODE_LABEL).unwrap(), "true");

        dir.clear_init_mark(&stored).unwrap();
        let stored = state.get_machine("fleet", "prod", "node-a").unwrap().unwrap();
        assert!(!stored.labels.contains_key(INIT_NODE_LABEL));
    }

    #[test]
    fn set_init_mark_is_idempotent() {
        let (dir, state) = directory();
        let machine = test_machine("node-a");
        state.put_machine(&machine).unwrap();

        let marked = dir.set_init_mark(&machine).unwrap();
        let again = dir.set_init_mark(&marked).unwrap();
        assert_eq!(marked, again);
    }

    #[test]
    fn clear_init_mark_on_unmarked_is_a_noop() {
        let (dir, _state) = directory();
        // Not even stored — the no-op path must not write.
        dir.clear_init_mark(&test_machine("node-a")).unwrap();
    }

    #[test]
    fn update_condition_replaces_same_type() {
        let (dir, state) = directory();
        let machine = test_machine("node-a");
        state.put_machine(&machine).unwrap();

        let waiting = MachineCondition {
            condition_type: "Provisioned".to_string(),
            status: "Unknown".to_string(),
            reason: "Waiting".to_string(),
            message: "waiting for agent".to_string(),
        };
        dir.update_condition(&machine, waiting.clone()).unwrap();

        let stored = state.get_machine("fleet", "prod", "node-a").unwrap().unwrap();
        assert_eq!(stored.status.conditions.len(), 1);

        let applied = MachineCondition {
            condition_type: "Provisioned".to_string(),
            status: "True".to_string(),
            reason: "Applied".to_string(),
            message: "plan applied".to_string(),
        };
        dir.update_condition(&stored, applied).unwrap();

        let stored = state.get_machine("fleet", "prod", "node-a").unwrap().unwrap();
        assert_eq!(stored.status.conditions.len(), 1);
        assert_eq!(stored.status.conditions[0].status, "True");
    }
}
