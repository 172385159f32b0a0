//! StateStore — redb-backed persistence for keel.
//!
//! Typed CRUD over clusters, machines, plan records, state secrets, and
//! registration tokens. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use redb::{Database, ReadableDatabase, ReadableTable};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use keel_core::{Cluster, ClusterSecrets};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// sha256 hex digest of serialized plan bytes.
///
/// This is the checksum the node agent reports to claim "I applied
/// exactly this plan".
pub fn plan_checksum(plan: &[u8]) -> String {
    hex::encode(Sha256::digest(plan))
}

fn random_token() -> String {
    // 27 random bytes → 54 hex chars.
    let mut buf = [0u8; 27];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(MACHINES).map_err(map_err!(Table))?;
        txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
        txn.open_table(STATE_SECRETS).map_err(map_err!(Table))?;
        txn.open_table(REGISTRATION_TOKENS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Insert or update a cluster.
    pub fn put_cluster(&self, cluster: &Cluster) -> StateResult<()> {
        let key = cluster.table_key();
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "cluster stored");
        Ok(())
    }

    /// Get a cluster by `{namespace}/{name}` key.
    pub fn get_cluster(&self, key: &str) -> StateResult<Option<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let cluster: Cluster =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(cluster))
            }
            None => Ok(None),
        }
    }

    /// List all clusters.
    pub fn list_clusters(&self) -> StateResult<Vec<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let cluster: Cluster =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(cluster);
        }
        Ok(results)
    }

    // ── Machines ───────────────────────────────────────────────────

    /// Insert or update a machine record.
    pub fn put_machine(&self, machine: &Machine) -> StateResult<()> {
        let key = machine.table_key();
        let value = serde_json::to_vec(machine).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a machine by namespace, cluster, and name.
    pub fn get_machine(
        &self,
        namespace: &str,
        cluster: &str,
        name: &str,
    ) -> StateResult<Option<Machine>> {
        let key = format!("{namespace}/{cluster}/{name}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let machine: Machine =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(machine))
            }
            None => Ok(None),
        }
    }

    /// List all member machines of a cluster, in name order.
    pub fn list_machines(&self, namespace: &str, cluster: &str) -> StateResult<Vec<Machine>> {
        let prefix = format!("{namespace}/{cluster}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let machine: Machine =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(machine);
            }
        }
        Ok(results)
    }

    /// Delete a machine record. Returns true if it existed.
    pub fn delete_machine(
        &self,
        namespace: &str,
        cluster: &str,
        name: &str,
    ) -> StateResult<bool> {
        let key = format!("{namespace}/{cluster}/{name}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(MACHINES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Plan records ───────────────────────────────────────────────

    /// Get the plan record for a machine. Absence is not an error — the
    /// machine simply has no plan yet.
    pub fn get_plan_record(
        &self,
        namespace: &str,
        cluster: &str,
        machine_name: &str,
    ) -> StateResult<Option<PlanRecord>> {
        let key = format!(
            "{namespace}/{cluster}/{}",
            PlanRecord::record_name(machine_name)
        );
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: PlanRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all plan records of a cluster.
    pub fn list_plan_records(&self, namespace: &str, cluster: &str) -> StateResult<Vec<PlanRecord>> {
        let prefix = format!("{namespace}/{cluster}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: PlanRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Overwrite the desired-plan field of a machine's record, creating
    /// the record if absent.
    ///
    /// Only the desired field is replaced; the applied plan and the
    /// agent-reported checksum are carried over untouched so a
    /// concurrent agent report is never clobbered.
    pub fn update_desired_plan(&self, machine: &Machine, plan: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
            let mut record = {
                let key = format!(
                    "{}/{}/{}",
                    machine.namespace,
                    machine.cluster_name,
                    PlanRecord::record_name(&machine.name)
                );
                match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?,
                    None => PlanRecord {
                        namespace: machine.namespace.clone(),
                        cluster_name: machine.cluster_name.clone(),
                        machine_name: machine.name.clone(),
                        ..PlanRecord::default()
                    },
                }
            };
            record.plan = Some(plan.to_vec());
            let key = record.table_key();
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(machine = %machine.name, "desired plan updated");
        Ok(())
    }

    /// Record the checksum a node agent reported for the plan it
    /// applied. The record must already exist — an agent cannot claim a
    /// plan that was never assigned.
    pub fn record_applied_checksum(
        &self,
        namespace: &str,
        cluster: &str,
        machine_name: &str,
        checksum: &str,
    ) -> StateResult<()> {
        let key = format!(
            "{namespace}/{cluster}/{}",
            PlanRecord::record_name(machine_name)
        );
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
            let mut record: PlanRecord = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key)),
            };
            record.applied_checksum = Some(checksum.to_string());
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Promote desired plans whose agent-reported checksum matches.
    ///
    /// For every plan record of the cluster: if the agent's reported
    /// checksum equals the sha256 of the current desired plan and the
    /// applied plan differs, copy the desired plan into the applied
    /// field. This is the handshake by which agent and planner agree on
    /// convergence without a two-phase commit. Returns the number of
    /// records promoted.
    pub fn sync_applied(&self, namespace: &str, cluster: &str) -> StateResult<u32> {
        let prefix = format!("{namespace}/{cluster}/");
        let mut promoted = 0;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MACHINE_PLANS).map_err(map_err!(Table))?;
            let records: Vec<PlanRecord> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    if !key.value().starts_with(&prefix) {
                        return None;
                    }
                    serde_json::from_slice(value.value()).ok()
                })
                .collect();

            for mut record in records {
                let (Some(plan), Some(checksum)) = (&record.plan, &record.applied_checksum)
                else {
                    continue;
                };
                if *checksum == plan_checksum(plan)
                    && record.applied_plan.as_deref() != record.plan.as_deref()
                {
                    record.applied_plan = record.plan.clone();
                    let key = record.table_key();
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    debug!(machine = %record.machine_name, "applied plan promoted");
                    promoted += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(promoted)
    }

    // ── State secrets ──────────────────────────────────────────────

    /// Fetch the cluster's shared token material, generating it on first
    /// use. Subsequent calls return the same values. Returns the derived
    /// secret name alongside the tokens.
    pub fn ensure_state_secret(&self, cluster: &Cluster) -> StateResult<(String, ClusterSecrets)> {
        let name = state_secret_name(&cluster.name);
        let key = format!("{}/{}", cluster.namespace, name);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let secrets;
        {
            let mut table = txn.open_table(STATE_SECRETS).map_err(map_err!(Table))?;
            let existing: Option<ClusterSecrets> = {
                match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => {
                        Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                    }
                    None => None,
                }
            };
            secrets = match existing {
                Some(existing) => existing,
                None => {
                    let generated = ClusterSecrets {
                        server_token: random_token(),
                        agent_token: random_token(),
                    };
                    let value = serde_json::to_vec(&generated).map_err(map_err!(Serialize))?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    info!(cluster = %cluster.name, secret = %name, "cluster state secret created");
                    generated
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok((name, secrets))
    }

    // ── Registration tokens ────────────────────────────────────────

    /// Insert or update a registration token.
    pub fn put_registration_token(&self, token: &RegistrationToken) -> StateResult<()> {
        let key = token.table_key();
        let value = serde_json::to_vec(token).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn
                .open_table(REGISTRATION_TOKENS)
                .map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// First registration token for a management cluster, by name order.
    pub fn first_registration_token(
        &self,
        cluster_name: &str,
    ) -> StateResult<Option<RegistrationToken>> {
        let prefix = format!("{cluster_name}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn
            .open_table(REGISTRATION_TOKENS)
            .map_err(map_err!(Table))?;
        // Keys iterate in lexicographic order, so the first prefixed
        // entry is the first token by name.
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let token: RegistrationToken =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}
