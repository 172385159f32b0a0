//! Machine condition summary.
//!
//! Collapses a machine's status conditions into the two bits the
//! reconciler cares about: is the machine reporting an error, and is it
//! still transitioning toward ready.

use keel_state::Machine;

/// Summary of a machine's reported health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    /// Some condition reports outright failure.
    pub error: bool,
    /// The machine has not settled yet (a condition is unresolved, or
    /// the machine is being deleted).
    pub transitioning: bool,
}

/// Summarize a machine's conditions.
///
/// A `"False"` condition status counts as an error; `"Unknown"` counts
/// as transitioning. A deleting machine is always transitioning.
pub fn summarize(machine: &Machine) -> HealthSummary {
    let mut summary = HealthSummary {
        error: false,
        transitioning: machine.deleting,
    };

    for condition in &machine.status.conditions {
        match condition.status.as_str() {
            "False" => summary.error = true,
            "Unknown" => summary.transitioning = true,
            _ => {}
        }
    }

    summary
}
