//! Meridian Validator Node
//!
//! Production binary for running a validator node.
//!
//! # Usage
//!
//! ```bash
//! # Start with a configuration file
//! meridian-validator --config validator.toml
//!
//! # Override the data directory
//! meridian-validator --config validator.toml --data-dir /var/lib/meridian
//! ```
//!
//! # Configuration
//!
//! See `ValidatorConfig` for all options. Example TOML:
//!
//! ```toml
//! [node]
//! validation_seed = "<32-byte hex>"
//! trusted_validators = ["<hex pubkey>", "..."]
//! data_dir = "./data"
//!
//! [consensus]
//! consensus_type = "builtin"   # or "external_arbiter"
//! tick_interval_ms = 1000
//!
//! [arbiter]
//! hosts = "127.0.0.1:2181"
//! namespace = "meridian"
//! ```
//!
//! The network overlay and the tx-set acquisition subsystem are not part
//! of this binary; embedders wire them to the runner's channel endpoints.
//! Run standalone, the node closes and validates ledgers from local
//! submissions only.

use anyhow::{Context, Result};
use clap::Parser;
use meridian_arbiter::{ArbiterHandle, CoordinationStore, MemoryCoordinationStore};
use meridian_consensus::ConsensusKind;
use meridian_node::NodeStateMachine;
use meridian_production::{init_tracing, ProductionRunner, RocksDbLedgerStore, ValidatorConfig};
use meridian_types::{CloseTime, Ledger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Meridian Validator Node
///
/// Runs a validator participating in ledger consensus.
#[derive(Parser, Debug)]
#[command(name = "meridian-validator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,meridian=debug");

    let cli = Cli::parse();
    let mut config = ValidatorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }

    let keys = config.keys().context("parsing validation key")?;
    let registry = Arc::new(config.registry().context("parsing trusted validators")?);
    match &keys {
        Some(keys) => info!(node_id = %keys.node_id(), "Validating with configured key"),
        None => info!("No validation key: running as observer"),
    }

    let storage = Arc::new(
        RocksDbLedgerStore::open(config.node.data_dir.join("ledgers"))
            .context("opening ledger store")?,
    );

    let wall_now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("system clock before epoch")?
        .as_secs();

    // Resume from the stored chain, or start a fresh one.
    let prev_ledger = match storage.latest().context("reading latest ledger")? {
        Some(ledger) => {
            info!(ledger = %ledger.id(), seq = %ledger.seq(), "Resuming from stored ledger");
            Arc::new(ledger)
        }
        None => {
            let genesis = Ledger::genesis(CloseTime(wall_now));
            storage.insert(&genesis).context("storing genesis")?;
            info!(ledger = %genesis.id(), "Starting a fresh chain");
            Arc::new(genesis)
        }
    };

    let consensus = config.consensus_config().context("consensus config")?;
    let arbiter = match consensus.kind {
        ConsensusKind::ExternalArbiter => {
            // The bundled backend is in-process; deployments with a real
            // coordination service supply their own store through the
            // library API.
            warn!(
                hosts = %config.arbiter.hosts,
                "External arbiter configured with the in-process store"
            );
            let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());
            Some(ArbiterHandle::init(store, &config.arbiter_config()))
        }
        ConsensusKind::Builtin => None,
    };

    let node = NodeStateMachine::new(consensus, registry, keys, prev_ledger, wall_now);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (runner, handle) = ProductionRunner::new(node, storage, arbiter, shutdown_rx);
    let runner_task = tokio::spawn(runner.run());

    // Keep the channel endpoints alive for the embedder; standalone we just
    // drain outbound traffic.
    let mut handle = handle;
    let drain = tokio::spawn(async move {
        while let Some(message) = handle.outbound.recv().await {
            tracing::trace!(message = message.type_name(), "Outbound (no overlay attached)");
        }
    });

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down");
    shutdown_tx.send(true).ok();
    runner_task.await.ok();
    drain.abort();
    Ok(())
}
