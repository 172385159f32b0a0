//! Well-known machine labels and annotations.
//!
//! Role membership and the init-node marker are boolean labels (value
//! `"true"`); the join URL and the extra label/taint blobs live in
//! annotations. These keys are the contract between keel and the
//! machine lifecycle components that stamp them.

/// Marks the single node elected to bootstrap the cluster.
pub const INIT_NODE_LABEL: &str = "keel.dev/init-node";

/// Etcd tier membership.
pub const ETCD_ROLE_LABEL: &str = "keel.dev/etcd-role";

/// Control-plane tier membership.
pub const CONTROL_PLANE_ROLE_LABEL: &str = "keel.dev/control-plane-role";

/// Worker tier membership.
pub const WORKER_ROLE_LABEL: &str = "keel.dev/worker-role";

/// Node label carrying the machine UID into every plan, used to
/// correlate a registered node back to its machine.
pub const MACHINE_UID_LABEL: &str = "keel.dev/machine";

/// Join address published by the init node once it is reachable.
pub const JOIN_URL_ANNOTATION: &str = "keel.dev/join-url";

/// JSON-encoded map of extra node labels.
pub const LABELS_ANNOTATION: &str = "keel.dev/labels";

/// JSON-encoded list of extra node taints.
pub const TAINTS_ANNOTATION: &str = "keel.dev/taints";
