//! The provisioning control loop.
//!
//! Every resync tick, for every cluster: promote agent-confirmed plans,
//! stamp each machine's `Provisioned` condition, run one planner pass,
//! and record the outcome on the cluster status. Passes for the same
//! cluster never overlap — the loop is the single caller — and a hard
//! error in one cluster's pass does not stop the others.

use std::time::Duration;

use tracing::{debug, error, info};

use keel_core::Cluster;
use keel_directory::NodeDirectory;
use keel_planner::{Outcome, Planner, plan_status};
use keel_state::{StateStore, state_secret_name};

/// Run the provisioning loop until shutdown.
pub async fn run_loop(
    planner: Planner,
    state: StateStore,
    resync_interval: Duration,
) -> anyhow::Result<()> {
    let directory = NodeDirectory::new(state.clone());
    let mut ticker = tokio::time::interval(resync_interval);
    info!(interval = ?resync_interval, "provisioning loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = resync(&planner, &state, &directory).await {
                    error!(error = %e, "resync failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
        }
    }
}

/// One resync over every cluster in the store.
pub async fn resync(
    planner: &Planner,
    state: &StateStore,
    directory: &NodeDirectory,
) -> anyhow::Result<()> {
    for cluster in state.list_clusters()? {
        if let Err(e) = resync_cluster(planner, state, directory, &cluster).await {
            // Hard error: the pass aborts and retries on the next tick.
            error!(cluster = %cluster.table_key(), error = %e, "provisioning pass failed");
        }
    }
    Ok(())
}

async fn resync_cluster(
    planner: &Planner,
    state: &StateStore,
    directory: &NodeDirectory,
    cluster: &Cluster,
) -> anyhow::Result<()> {
    // Promote plans the node agents confirmed since the last tick.
    let promoted = state.sync_applied(&cluster.namespace, &cluster.name)?;
    if promoted > 0 {
        debug!(cluster = %cluster.name, promoted, "applied plans promoted");
    }

    // Keep each machine's Provisioned condition current.
    for machine in directory.list_members(&cluster.namespace, &cluster.name)? {
        let record = state.get_plan_record(&cluster.namespace, &cluster.name, &machine.name)?;
        directory.update_condition(&machine, plan_status(record.as_ref()))?;
    }

    let outcome = planner.process(cluster).await?;

    // Persist the outcome on the cluster status (planner never does).
    let mut updated = cluster.clone();
    updated.status.ready = outcome == Outcome::Converged;
    updated.status.message = outcome.message().to_string();
    updated.status.state_secret_name = state_secret_name(&cluster.name);
    if updated.status != cluster.status {
        state.put_cluster(&updated)?;
    }

    debug!(cluster = %cluster.name, status = %updated.status.message, "pass complete");
    Ok(())
}
