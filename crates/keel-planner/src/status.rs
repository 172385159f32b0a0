//! Provisioned-condition reporting.
//!
//! Maps a machine's plan record to the `Provisioned` status condition
//! the daemon stamps on the machine, so operators can see where each
//! node stands in the agent handshake.

use keel_state::{MachineCondition, PlanRecord};

/// Condition type stamped on machines by the provisioning loop.
pub const PROVISIONED_CONDITION: &str = "Provisioned";

/// Compute the `Provisioned` condition for a machine's plan record.
pub fn plan_status(record: Option<&PlanRecord>) -> MachineCondition {
    let (status, reason, message) = match record {
        None => ("Unknown", "Waiting", "waiting for plan to be assigned"),
        Some(record) if record.plan.is_none() => {
            ("Unknown", "Waiting", "waiting for plan to be assigned")
        }
        Some(record) if record.in_sync() => ("True", "Applied", "plan applied"),
        Some(record) if record.applied_checksum.is_none() => {
            ("Unknown", "Waiting", "waiting for agent to check in")
        }
        Some(_) => ("Unknown", "Provisioning", "waiting for plan to be applied"),
    };

    MachineCondition {
        condition_type: PROVISIONED_CONDITION.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
    }
}
