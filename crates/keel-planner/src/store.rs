//! Plan store facade — snapshot loading and desired-plan writes.
//!
//! `PlanStore::load` joins a cluster's member machines with their plan
//! records into an in-memory `PlanSnapshot`, rebuilt on every pass and
//! never cached. `PlanStore::update_plan` serializes a `NodePlan` and
//! overwrites only the desired field of the backing record.

use std::collections::BTreeMap;

use keel_core::{Cluster, NodePlan};
use keel_state::{Machine, StateStore};

use crate::error::PlannerResult;
use crate::roles::RoleFilter;

/// Parsed convergence record for one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    /// Last desired plan written for the machine.
    pub plan: NodePlan,
    /// Last plan the machine's agent was confirmed to have applied.
    pub applied: Option<NodePlan>,
    /// True iff the stored desired and applied payloads are identical.
    pub in_sync: bool,
}

/// One pass's view of a cluster: members joined with their plan records.
#[derive(Debug, Clone, Default)]
pub struct PlanSnapshot {
    /// Member machines, in name order.
    pub machines: Vec<Machine>,
    /// Plan entries by machine name. A machine without an entry has not
    /// been assigned a plan yet.
    pub entries: BTreeMap<String, PlanEntry>,
}

impl PlanSnapshot {
    /// Machines matching `include`, paired with their plan entries,
    /// in name order.
    pub fn collect(&self, include: RoleFilter) -> Vec<(&Machine, Option<&PlanEntry>)> {
        self.machines
            .iter()
            .filter(|&m| include(m))
            .map(|m| (m, self.entries.get(&m.name)))
            .collect()
    }

    /// Replace a machine the pass just patched (init marker), so later
    /// steps of the same pass see the update.
    pub fn replace_machine(&mut self, updated: Machine) {
        if let Some(slot) = self.machines.iter_mut().find(|m| m.name == updated.name) {
            *slot = updated;
        }
    }
}

/// Store facade the planner reads snapshots from and writes desired
/// plans through.
#[derive(Clone)]
pub struct PlanStore {
    state: StateStore,
}

impl PlanStore {
    /// Create a new plan store over the given state store.
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Load the plan snapshot for a cluster.
    ///
    /// A machine without a plan record (or with a record that has no
    /// desired plan yet) simply has no entry; that is not an error.
    pub fn load(&self, cluster: &Cluster) -> PlannerResult<PlanSnapshot> {
        let machines = self
            .state
            .list_machines(&cluster.namespace, &cluster.name)?;

        let mut entries = BTreeMap::new();
        for machine in &machines {
            let Some(record) =
                self.state
                    .get_plan_record(&cluster.namespace, &cluster.name, &machine.name)?
            else {
                continue;
            };
            let Some(plan_bytes) = &record.plan else {
                continue;
            };
            let plan: NodePlan = serde_json::from_slice(plan_bytes)?;
            let applied = match &record.applied_plan {
                Some(bytes) => Some(serde_json::from_slice(bytes)?),
                None => None,
            };
            entries.insert(
                machine.name.clone(),
                PlanEntry {
                    plan,
                    applied,
                    in_sync: record.in_sync(),
                },
            );
        }

        Ok(PlanSnapshot { machines, entries })
    }

    /// Write a machine's desired plan, preserving the applied fields.
    pub fn update_plan(&self, machine: &Machine, plan: &NodePlan) -> PlannerResult<()> {
        let bytes = serde_json::to_vec(plan)?;
        self.state.update_desired_plan(machine, &bytes)?;
        Ok(())
    }
}
