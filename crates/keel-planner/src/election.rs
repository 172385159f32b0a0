//! Init-node election.
//!
//! Exactly one etcd-tier machine carries the init-node marker at a
//! time: it is the node that bootstraps a fresh cluster and the join
//! point every other node dials. Election clears stale markers (deleted
//! machines, duplicate marks) before trusting any marked node, then
//! marks the first live etcd machine if none survived.

use tracing::debug;

use keel_directory::{NodeDirectory, join_url};

use crate::error::PlannerResult;
use crate::roles::{is_etcd, is_init_node};
use crate::store::PlanSnapshot;

/// Elect (or confirm) the cluster's init node and return its join URL.
///
/// Returns `None` when no join address is available yet — either the
/// etcd tier is empty, or the init node has not published its URL.
/// Neither case is an error; the caller treats it as "not yet
/// electable". Machines patched here are replaced in the snapshot so
/// the rest of the pass sees the marker.
pub fn elect_init_node(
    directory: &NodeDirectory,
    snapshot: &mut PlanSnapshot,
) -> PlannerResult<Option<String>> {
    let etcd_members: Vec<usize> = snapshot
        .machines
        .iter()
        .enumerate()
        .filter(|&(_, m)| is_etcd(m))
        .map(|(i, _)| i)
        .collect();

    let mut accepted_join_url = None;
    let mut accepted = false;

    for &i in &etcd_members {
        let machine = snapshot.machines[i].clone();
        if !is_init_node(&machine) {
            continue;
        }

        // Clear stale or duplicate init markers before trusting anyone.
        if machine.deleting || accepted {
            let updated = directory.clear_init_mark(&machine)?;
            snapshot.machines[i] = updated;
            continue;
        }

        accepted = true;
        accepted_join_url = join_url(&machine);
    }

    if accepted {
        return Ok(accepted_join_url);
    }

    // Nobody is marked: elect the first live etcd machine by name.
    let Some(&first) = etcd_members
        .iter()
        .find(|&&i| !snapshot.machines[i].deleting)
    else {
        debug!("no electable etcd machine yet");
        return Ok(None);
    };

    let updated = directory.set_init_mark(&snapshot.machines[first])?;
    let url = join_url(&updated);
    snapshot.machines[first] = updated;
    Ok(url)
}
