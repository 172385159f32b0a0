//! redb table definitions for the keel state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{namespace}/{name}` or
//! `{namespace}/{cluster}/{name}` for cluster-scoped prefix scans.

use redb::TableDefinition;

/// Cluster specs keyed by `{namespace}/{name}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Machine records keyed by `{namespace}/{cluster}/{machine}`.
pub const MACHINES: TableDefinition<&str, &[u8]> = TableDefinition::new("machines");

/// Per-node plan records keyed by `{namespace}/{cluster}/{record-name}`,
/// where the record name is derived from the machine name.
pub const MACHINE_PLANS: TableDefinition<&str, &[u8]> = TableDefinition::new("machine-plans");

/// Per-cluster token material keyed by `{namespace}/{secret-name}`.
pub const STATE_SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("state-secrets");

/// Cluster-agent registration tokens keyed by `{management-cluster}/{token-name}`.
pub const REGISTRATION_TOKENS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("registration-tokens");
