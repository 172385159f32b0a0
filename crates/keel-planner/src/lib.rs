//! keel-planner — the provisioning planner.
//!
//! Turns a declarative `Cluster` into per-node bootstrap plans and rolls
//! plan changes out across node tiers under a bounded concurrency
//! budget. One `Planner::process` call is one synchronous pass:
//!
//! ```text
//! Planner::process(cluster)
//!   ├── PlanStore::load            — members ⋈ plan records (snapshot)
//!   ├── ensure_state_secret        — per-cluster tokens, created once
//!   ├── elect_init_node            — single bootstrap/join point
//!   ├── reconcile "bootstrap"      — init node only, no join address
//!   ├── elect_init_node (again)    — pick up the published join URL
//!   ├── reconcile "etcd"           — excluding the init node
//!   ├── reconcile "control-plane"  — excluding the init node
//!   └── reconcile "worker"         — only-worker nodes
//! ```
//!
//! A tier that blocks (nodes out of sync, or no members yet) stops the
//! pipeline and the pass reports `Outcome::Waiting`; degraded-but-
//! non-blocking conditions are carried through and surfaced once the
//! rest of the pass converges. Hard failures (store I/O, malformed
//! selectors or annotations, manifest fetch) abort the pass as `Err`.

pub mod compile;
pub mod election;
pub mod error;
pub mod manifest;
pub mod outcome;
pub mod planner;
pub mod reconcile;
pub mod roles;
pub mod status;
pub mod store;

pub use compile::desired_plan;
pub use election::elect_init_node;
pub use error::{PlannerError, PlannerResult};
pub use manifest::{ManifestError, ManifestFuture, ManifestSource};
pub use outcome::{Outcome, TierStatus};
pub use planner::Planner;
pub use status::{PROVISIONED_CONDITION, plan_status};
pub use store::{PlanEntry, PlanSnapshot, PlanStore};
