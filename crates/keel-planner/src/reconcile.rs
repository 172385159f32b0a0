//! Tiered reconciliation — the rollout scheduling core.
//!
//! One `reconcile_tier` call processes every member of a tier in name
//! order, compares each machine's freshly compiled plan against the
//! stored record, and admits plan writes under the tier's concurrency
//! budget: a write that flips a previously in-sync node to out-of-sync
//! consumes budget; rewriting an already out-of-sync node is free. Only
//! the count of simultaneously unavailable nodes is bounded — never the
//! order in which admitted nodes converge.

use tracing::debug;

use keel_core::{Cluster, ClusterSecrets};

use crate::compile::desired_plan;
use crate::error::PlannerResult;
use crate::outcome::TierStatus;
use crate::planner::Planner;
use crate::roles::{RoleFilter, is_init_node};
use crate::store::PlanSnapshot;

impl Planner {
    /// Reconcile one tier of the cluster.
    pub(crate) async fn reconcile_tier(
        &self,
        cluster: &Cluster,
        secrets: &ClusterSecrets,
        snapshot: &PlanSnapshot,
        tier: &str,
        include: RoleFilter,
        exclude: RoleFilter,
        concurrency: u32,
        join_url: &str,
    ) -> PlannerResult<TierStatus> {
        let selected = snapshot.collect(include);

        // The budget starts charged with every member that is already
        // mid-rollout.
        let mut unavailable = selected
            .iter()
            .filter(|(_, entry)| entry.is_some_and(|e| !e.in_sync))
            .count() as u32;

        // Tier membership is judged before exclusion so an empty tier
        // is distinguishable from a fully-excluded one.
        let member_count = selected.len();

        let mut out_of_sync = Vec::new();
        let mut failing = Vec::new();
        let mut non_ready = Vec::new();

        for (machine, entry) in selected {
            if exclude(machine) {
                continue;
            }

            let health = keel_directory::summarize(machine);
            if health.error {
                failing.push(machine.name.clone());
            }
            if health.transitioning {
                non_ready.push(machine.name.clone());
            }

            let plan = desired_plan(
                cluster,
                secrets,
                machine,
                is_init_node(machine),
                join_url,
                &self.settings,
                self.manifests.as_ref(),
            )
            .await?;

            match entry {
                None => {
                    // First plan for this machine: written unconditionally.
                    out_of_sync.push(machine.name.clone());
                    self.store.update_plan(machine, &plan)?;
                }
                Some(entry) if entry.plan != plan => {
                    out_of_sync.push(machine.name.clone());
                    if !entry.in_sync || concurrency == 0 || unavailable < concurrency {
                        if entry.in_sync {
                            unavailable += 1;
                        }
                        self.store.update_plan(machine, &plan)?;
                    }
                }
                Some(entry) if !entry.in_sync => {
                    // Desired already matches; the agent hasn't caught up.
                    out_of_sync.push(machine.name.clone());
                }
                Some(_) => {}
            }
        }

        debug!(
            tier,
            members = member_count,
            out_of_sync = out_of_sync.len(),
            failing = failing.len(),
            non_ready = non_ready.len(),
            "tier reconciled"
        );

        if member_count == 0 {
            return Ok(TierStatus::Blocked(format!(
                "waiting for at least one {tier} node"
            )));
        }

        // Blocking takes priority over degraded for the tier's status.
        if !out_of_sync.is_empty() {
            return Ok(TierStatus::Blocked(format!(
                "provisioning {tier} node(s) {}",
                at_most_three(out_of_sync).join(",")
            )));
        }

        if !failing.is_empty() {
            return Ok(TierStatus::Degraded(format!(
                "failing {tier} node(s) {}",
                at_most_three(failing).join(",")
            )));
        }

        if !non_ready.is_empty() {
            return Ok(TierStatus::Degraded(format!(
                "non-ready {tier} node(s) {}",
                at_most_three(non_ready).join(",")
            )));
        }

        Ok(TierStatus::Converged)
    }
}

/// Sort names and keep at most three as examples for status messages.
fn at_most_three(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.truncate(3);
    names
}
