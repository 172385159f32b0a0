//! Role classification predicates.
//!
//! Pure functions over a machine's labels. Missing or unrecognized
//! label values classify as false; a machine carrying no role label at
//! all falls through to the only-worker catch-all.

use keel_directory::labels::{CONTROL_PLANE_ROLE_LABEL, ETCD_ROLE_LABEL, INIT_NODE_LABEL};
use keel_state::Machine;

/// Tier inclusion/exclusion predicate.
pub type RoleFilter = fn(&Machine) -> bool;

fn has_true_label(machine: &Machine, label: &str) -> bool {
    machine.labels.get(label).map(String::as_str) == Some("true")
}

/// Member of the etcd tier.
pub fn is_etcd(machine: &Machine) -> bool {
    has_true_label(machine, ETCD_ROLE_LABEL)
}

/// Member of the control-plane tier.
pub fn is_control_plane(machine: &Machine) -> bool {
    has_true_label(machine, CONTROL_PLANE_ROLE_LABEL)
}

/// The elected bootstrap node.
pub fn is_init_node(machine: &Machine) -> bool {
    has_true_label(machine, INIT_NODE_LABEL)
}

/// Etcd member that is not also a control-plane node.
pub fn is_only_etcd(machine: &Machine) -> bool {
    is_etcd(machine) && !is_control_plane(machine)
}

/// Plain worker: neither etcd nor control-plane.
pub fn is_only_worker(machine: &Machine) -> bool {
    !is_etcd(machine) && !is_control_plane(machine)
}

/// Matches nothing; the empty exclusion filter.
pub fn none(_machine: &Machine) -> bool {
    false
}
