//! CLI harness for running and inspecting the block sync engine
//!
//! - `sync`: run the listener against a node until Ctrl-C
//! - `status`: cursor, checkpoints and address balances
//! - `rollback`: manual rollback to a height
//! - `verify`: compare local live cells with the node

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use indicatif::{ProgressBar, ProgressStyle};
use neuron_core::{LockHash, TrackedAddress};
use neuron_storage_sqlite::{CellStore, Database, JsonAddressStore, SyncStateStorage};
use neuron_sync::{
    verify_live_cells, BalanceAggregator, BlockListener, CancelToken, ChainTipTracker,
    ChangeNotifier, Config, HttpNodeClient, NodeClient, SyncStores, TipPoller,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sync-harness")]
#[command(about = "Neuron block sync harness", long_about = None)]
struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory; falls back to NEURON_DATA_DIR, then the platform data dir
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON logs and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync until Ctrl-C
    Sync {
        /// Lock hashes to track (defaults to every stored address)
        #[arg(long = "lock-hash")]
        lock_hashes: Vec<String>,
    },

    /// Show cursor, checkpoints and balances
    Status,

    /// Discard everything above a height
    Rollback {
        /// Height to keep
        #[arg(long)]
        to: u64,
    },

    /// Compare local live cells with the node
    Verify {
        /// Lock hash to check
        #[arg(long)]
        lock_hash: String,
    },
}

struct Workspace {
    config: Config,
    db: Arc<Database>,
    addresses: Arc<JsonAddressStore>,
}

impl Workspace {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.validate()?;

        let data_dir = resolve_data_dir(cli.data_dir.clone())?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        info!("Data directory: {}", data_dir.display());

        let db = Arc::new(Database::open(data_dir.join("sync.db"))?);
        let addresses = Arc::new(JsonAddressStore::open(&data_dir)?);
        Ok(Self {
            config,
            db,
            addresses,
        })
    }

    fn stores(&self) -> SyncStores {
        SyncStores::sqlite(self.db.clone(), self.addresses.clone())
    }

    fn aggregator(&self) -> BalanceAggregator {
        let stores = self.stores();
        BalanceAggregator::new(
            stores.cells,
            stores.addresses,
            self.config.lock_utils(),
            ChangeNotifier::new(),
        )
    }
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var("NEURON_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("org", "nervos", "neuron")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .context("no data directory available; pass --data-dir")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    let workspace = Workspace::open(&cli)?;

    match &cli.command {
        Commands::Sync { lock_hashes } => run_sync(&workspace, lock_hashes).await,
        Commands::Status => run_status(&workspace, cli.json),
        Commands::Rollback { to } => run_rollback(&workspace, *to),
        Commands::Verify { lock_hash } => run_verify(&workspace, lock_hash, cli.json).await,
    }
}

fn parse_lock_hashes(raw: &[String]) -> anyhow::Result<HashSet<LockHash>> {
    raw.iter()
        .map(|s| {
            s.parse::<LockHash>()
                .with_context(|| format!("invalid lock hash {}", s))
        })
        .collect()
}

async fn run_sync(workspace: &Workspace, raw_lock_hashes: &[String]) -> anyhow::Result<()> {
    let node: Arc<dyn NodeClient> = Arc::new(HttpNodeClient::new(&workspace.config.node)?);
    let sync = workspace.config.sync.clone();

    let lock_hashes = if raw_lock_hashes.is_empty() {
        workspace.aggregator().tracked_lock_hashes()?
    } else {
        parse_lock_hashes(raw_lock_hashes)?
    };
    if lock_hashes.is_empty() {
        warn!("No lock hashes to track; only the cursor will advance");
    }

    let tip = ChainTipTracker::new();
    let poller_cancel = CancelToken::new();
    let poller = TipPoller::spawn(
        node.clone(),
        tip.clone(),
        sync.tip_poll_interval(),
        poller_cancel.clone(),
    );

    let listener = Arc::new(BlockListener::new(
        node,
        workspace.stores(),
        ChangeNotifier::new(),
        tip,
        workspace.config.lock_utils(),
        sync,
    )?);

    info!(
        "Syncing {} lock hashes from {}",
        lock_hashes.len(),
        workspace.config.node.url
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% {msg}")?
            .progress_chars("=>-"),
    );
    let progress = listener.progress().clone();
    let pb_updater = pb.clone();
    let progress_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            pb_updater.set_position(progress.percentage() as u64);
            pb_updater.set_message(progress.summary());
        }
    });

    let runner = listener.clone();
    let mut sync_handle = tokio::spawn(async move { runner.start(lock_hashes).await });

    let result = tokio::select! {
        res = &mut sync_handle => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping listener");
            listener
                .stop(Some(Box::new(|| info!("Sync queue drained"))))
                .await;
            sync_handle.await?
        }
    };

    poller_cancel.cancel();
    progress_task.abort();
    if let Err(e) = poller.await {
        warn!("Tip poller ended abnormally: {}", e);
    }
    pb.finish_with_message(listener.progress().summary());

    result?;
    info!("Stopped at cursor {:?}", listener.processor().cursor());
    Ok(())
}

fn run_status(workspace: &Workspace, json: bool) -> anyhow::Result<()> {
    let sync_state = SyncStateStorage::new(workspace.db.clone());
    let state = sync_state.load_sync_state()?;
    let checkpoints = sync_state.recent_checkpoints(workspace.config.sync.reorg_window)?;
    let addresses = workspace.addresses.get_all()?;

    if json {
        let status = serde_json::json!({
            "cursor": state.cursor,
            "updatedAt": state.updated_at,
            "checkpoints": checkpoints,
            "addresses": addresses,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match state.cursor {
        Some(cursor) => println!("Cursor: {}", cursor),
        None => println!("Cursor: (nothing processed)"),
    }
    println!("Checkpoints: {}", checkpoints.len());
    for checkpoint in &checkpoints {
        println!("  {:>10}  {}", checkpoint.height, checkpoint.block_hash);
    }
    println!("Addresses: {}", addresses.len());
    for address in &addresses {
        print_address(address);
    }
    Ok(())
}

fn print_address(address: &TrackedAddress) {
    println!(
        "  {} [{:?} #{}] txs={} live={} sent={} pending={} balance={}",
        address.address,
        address.address_type,
        address.address_index,
        address.tx_count,
        address.live_balance,
        address.sent_balance,
        address.pending_balance,
        address.balance
    );
}

fn run_rollback(workspace: &Workspace, height: u64) -> anyhow::Result<()> {
    let sync_state = SyncStateStorage::new(workspace.db.clone());
    let cursor = match sync_state.load_cursor()? {
        Some(cursor) if height < cursor => cursor,
        current => {
            info!("Cursor at {:?}, nothing to roll back to {}", current, height);
            return Ok(());
        }
    };

    let cells = CellStore::new(workspace.db.clone());
    let affected = cells.revert_above(height)?;
    sync_state.rollback_to(height)?;
    let changed = workspace.aggregator().refresh_all()?;

    info!(
        "Rolled back from {} to {}: {} lock hashes affected, {} addresses updated",
        cursor,
        height,
        affected.len(),
        changed
    );
    Ok(())
}

async fn run_verify(workspace: &Workspace, raw_lock_hash: &str, json: bool) -> anyhow::Result<()> {
    let lock_hash: LockHash = raw_lock_hash
        .parse()
        .with_context(|| format!("invalid lock hash {}", raw_lock_hash))?;
    let node = HttpNodeClient::new(&workspace.config.node)?;
    let cells = CellStore::new(workspace.db.clone());

    let report = verify_live_cells(&node, &cells, &lock_hash).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for out_point in &report.missing {
            println!("missing  {}", out_point);
        }
        for out_point in &report.extra {
            println!("extra    {}", out_point);
        }
    }

    if !report.is_consistent() {
        bail!(
            "{} missing and {} extra live cells",
            report.missing.len(),
            report.extra.len()
        );
    }
    println!("Live cells match the node");
    Ok(())
}
