//! keeld — the keel daemon.
//!
//! Single binary hosting the cluster provisioning loop:
//! - State store (redb)
//! - Node directory
//! - Provisioning planner (election, plan compilation, tiered rollout)
//! - Cluster-agent manifest client
//!
//! # Usage
//!
//! ```text
//! keeld run --data-dir /var/lib/keel --settings /etc/keel/keel.toml
//! keeld plan fleet/prod --data-dir /var/lib/keel
//! ```

mod provision;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use keel_agent::AgentManifestClient;
use keel_core::Settings;
use keel_planner::Planner;
use keel_state::StateStore;

#[derive(Parser)]
#[command(name = "keeld", about = "Keel daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the provisioning control loop.
    Run {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/keel")]
        data_dir: PathBuf,

        /// Settings file (management server, CA bundle, images).
        #[arg(long, default_value = "/etc/keel/keel.toml")]
        settings: PathBuf,

        /// Resync interval in seconds.
        #[arg(long, default_value = "30")]
        resync_interval: u64,

        /// Start with the provisioning subsystem disabled.
        #[arg(long)]
        no_provision: bool,
    },

    /// Print a cluster's stored plan records as JSON.
    Plan {
        /// Cluster key, `namespace/name`.
        cluster: String,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/keel")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keeld=debug,keel=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            settings,
            resync_interval,
            no_provision,
        } => run(data_dir, settings, resync_interval, no_provision).await,
        Command::Plan { cluster, data_dir } => print_plan(&cluster, data_dir),
    }
}

async fn run(
    data_dir: PathBuf,
    settings_path: PathBuf,
    resync_interval: u64,
    no_provision: bool,
) -> anyhow::Result<()> {
    info!("keel daemon starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("keel.redb");

    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let settings = Settings::from_file(&settings_path)?;
    info!(server = %settings.server.url, "settings loaded");

    if no_provision {
        info!("provisioning subsystem disabled; idling until shutdown");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let manifests = Arc::new(AgentManifestClient::new(settings.clone(), state.clone()));
    let planner = Planner::new(state.clone(), settings, manifests);
    info!("planner initialized");

    provision::run_loop(planner, state, Duration::from_secs(resync_interval)).await
}

fn print_plan(cluster_key: &str, data_dir: PathBuf) -> anyhow::Result<()> {
    let state = StateStore::open(&data_dir.join("keel.redb"))?;
    let cluster = state
        .get_cluster(cluster_key)?
        .ok_or_else(|| anyhow::anyhow!("no such cluster: {cluster_key}"))?;

    let records = state.list_plan_records(&cluster.namespace, &cluster.name)?;
    let rendered: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let decode = |bytes: &Option<Vec<u8>>| {
                bytes
                    .as_deref()
                    .and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok())
            };
            serde_json::json!({
                "machine": record.machine_name,
                "inSync": record.in_sync(),
                "plan": decode(&record.plan),
                "appliedPlan": decode(&record.applied_plan),
                "appliedChecksum": record.applied_checksum,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}
