//! keel-state — redb-backed state persistence for keel.
//!
//! One durable store shared by the directory, the planner, and the
//! daemon. It holds:
//!
//! - **clusters** — the declarative provisioning targets
//! - **machines** — cluster member records with role labels and annotations
//! - **machine plans** — per-node desired/applied plan records
//! - **state secrets** — per-cluster shared token material
//! - **registration tokens** — cluster-agent registration material
//!
//! The desired and applied plan fields of a plan record are written by
//! different parties (the planner and the node agent) and are updated
//! independently so neither writer clobbers the other.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{StateStore, plan_checksum};
pub use types::*;
