//! The planner — orchestrates one provisioning pass.
//!
//! A pass is synchronous and single-flight per cluster: the caller (an
//! event-driven control loop) guarantees passes for the same cluster
//! never overlap, so the planner holds no locks and no state between
//! calls. Hard errors abort the pass; everything else folds into an
//! `Outcome`.

use std::sync::Arc;

use tracing::{debug, info};

use keel_core::{Cluster, Settings};
use keel_directory::NodeDirectory;
use keel_state::StateStore;

use crate::election::elect_init_node;
use crate::error::PlannerResult;
use crate::manifest::ManifestSource;
use crate::outcome::{Outcome, TierStatus};
use crate::roles::{RoleFilter, is_control_plane, is_etcd, is_init_node, is_only_worker, none};
use crate::store::{PlanSnapshot, PlanStore};

/// Drives cluster provisioning passes.
pub struct Planner {
    pub(crate) state: StateStore,
    pub(crate) store: PlanStore,
    pub(crate) directory: NodeDirectory,
    pub(crate) settings: Settings,
    pub(crate) manifests: Arc<dyn ManifestSource>,
}

impl Planner {
    /// Create a new planner over the given store.
    pub fn new(state: StateStore, settings: Settings, manifests: Arc<dyn ManifestSource>) -> Self {
        Self {
            store: PlanStore::new(state.clone()),
            directory: NodeDirectory::new(state.clone()),
            state,
            settings,
            manifests,
        }
    }

    /// Run one provisioning pass for a cluster.
    ///
    /// Tiers roll out strictly in order — bootstrap, etcd,
    /// control-plane, worker — and a blocked tier stops the pipeline.
    /// The first degraded (non-blocking) reason seen anywhere is what a
    /// converged pass reports, so operators see the earliest anomaly.
    pub async fn process(&self, cluster: &Cluster) -> PlannerResult<Outcome> {
        let mut snapshot = self.store.load(cluster)?;

        let (secret_name, secrets) = self.state.ensure_state_secret(cluster)?;
        // Stamped on a working copy only; persisting cluster status is
        // the caller's responsibility.
        let mut cluster = cluster.clone();
        cluster.status.state_secret_name = secret_name;

        elect_init_node(&self.directory, &mut snapshot)?;

        let strategy = cluster.spec.upgrade_strategy.clone();
        let mut first_degraded: Option<String> = None;

        let status = self
            .reconcile_tier(
                &cluster,
                &secrets,
                &snapshot,
                "bootstrap",
                is_init_node,
                none,
                strategy.server_concurrency,
                "",
            )
            .await?;
        match status {
            TierStatus::Blocked(reason) => {
                info!(cluster = %cluster.name, %reason, "pass waiting");
                return Ok(Outcome::Waiting(reason));
            }
            TierStatus::Degraded(reason) => {
                first_degraded.get_or_insert(reason);
            }
            TierStatus::Converged => {}
        }

        // Re-elect to pick up the join URL the init node published.
        let Some(join_url) = elect_init_node(&self.directory, &mut snapshot)? else {
            let reason = "waiting for join url to be available on init node".to_string();
            info!(cluster = %cluster.name, %reason, "pass waiting");
            return Ok(Outcome::Waiting(reason));
        };

        let tiers: [(&str, RoleFilter, u32); 3] = [
            ("etcd", is_etcd, strategy.server_concurrency),
            ("control-plane", is_control_plane, strategy.server_concurrency),
            ("worker", is_only_worker, strategy.worker_concurrency),
        ];

        for (tier, include, concurrency) in tiers {
            let status = self
                .reconcile_tier(
                    &cluster,
                    &secrets,
                    &snapshot,
                    tier,
                    include,
                    is_init_node,
                    concurrency,
                    &join_url,
                )
                .await?;
            match status {
                TierStatus::Blocked(reason) => {
                    info!(cluster = %cluster.name, tier, %reason, "pass waiting");
                    return Ok(Outcome::Waiting(reason));
                }
                TierStatus::Degraded(reason) => {
                    debug!(cluster = %cluster.name, tier, %reason, "tier degraded");
                    first_degraded.get_or_insert(reason);
                }
                TierStatus::Converged => {}
            }
        }

        Ok(match first_degraded {
            Some(reason) => Outcome::Waiting(reason),
            None => {
                info!(cluster = %cluster.name, "cluster converged");
                Outcome::Converged
            }
        })
    }

    /// The current plan snapshot for a cluster, as the last pass left it.
    pub fn current_plan(&self, cluster: &Cluster) -> PlannerResult<PlanSnapshot> {
        self.store.load(cluster)
    }
}
