//! CLI harness for account sync
//!
//! This tool allows:
//! - Watching an address against a live toncenter endpoint
//! - Inspecting the persisted status and history of an address
//! - Wiping the local store

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tonhub_params::{Network, NetworkType};
use tonhub_storage::{AccountAddress, AccountRepository, AccountStatus, SqliteStore};
use tonhub_sync::{AccountSync, SyncConfig, TonCenterClient, TonCenterConfig};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sync-harness")]
#[command(about = "TON account sync harness", long_about = None)]
struct Cli {
    /// SQLite database (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll an address and persist its history
    Watch {
        /// Account address (raw or user-friendly)
        #[arg(short, long)]
        address: AccountAddress,

        /// Network
        #[arg(short, long, default_value = "mainnet")]
        network: NetworkType,

        /// toncenter API key
        #[arg(long, env = "TONCENTER_API_KEY")]
        api_key: Option<String>,

        /// Stop after N published statuses
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Page in the full history before polling
        #[arg(long)]
        full_history: bool,

        /// Print the retained sync events on exit
        #[arg(long)]
        events: bool,
    },

    /// Print the persisted status and history of an address
    Inspect {
        /// Account address (raw or user-friendly)
        #[arg(short, long)]
        address: AccountAddress,

        /// Also print transaction bodies
        #[arg(long)]
        bodies: bool,
    },

    /// Delete all local sync state
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db = match cli.db {
        Some(path) => path,
        None => default_db_path(),
    };

    match cli.command {
        Commands::Watch {
            address,
            network,
            api_key,
            iterations,
            full_history,
            events,
        } => {
            run_watch(db, address, network, api_key, iterations, full_history, events).await?;
        }
        Commands::Inspect { address, bodies } => {
            run_inspect(db, address, bodies)?;
        }
        Commands::Wipe { yes } => {
            run_wipe(db, yes)?;
        }
    }

    Ok(())
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "Tonhub", "tonhub-sync")
        .map(|dirs| dirs.data_dir().join("sync.db"))
        .unwrap_or_else(|| PathBuf::from("tonhub-sync.db"))
}

fn open_repository(db: &Path) -> anyhow::Result<AccountRepository> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    Ok(AccountRepository::new(Arc::new(store)))
}

fn describe(status: &AccountStatus) -> String {
    format!(
        "{} nanoton | {} | {} txs loaded{} | synced at {}",
        status.balance,
        status.state.as_str(),
        status.loaded_transactions,
        if status.is_history_complete() { "" } else { " (more upstream)" },
        status.sync_time
    )
}

async fn run_watch(
    db: PathBuf,
    address: AccountAddress,
    network_type: NetworkType,
    api_key: Option<String>,
    iterations: Option<u64>,
    full_history: bool,
    print_events: bool,
) -> anyhow::Result<()> {
    let network = Network::from_type(network_type);
    info!("Watching {} on {}", address, network.name);
    info!("Database: {}", db.display());

    let mut client_config = TonCenterConfig::for_network(&network);
    if let Some(key) = api_key {
        client_config = client_config.with_api_key(key);
    }
    let client = Arc::new(TonCenterClient::new(client_config)?);
    let repository = open_repository(&db)?;
    let config = SyncConfig::from_env()?;

    let handle = AccountSync::new(address, client, repository, config)?.spawn();
    let mut status_rx = handle.subscribe();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("waiting for first sync...");

    let mut updates = 0u64;
    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    warn!("Sync driver exited");
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                let Some(status) = status else { continue };
                pb.set_message(describe(&status));
                updates += 1;

                if full_history && !status.is_history_complete() {
                    let added = handle.load_more().await?;
                    info!("Loaded {} older transactions", added);
                }
                if iterations.is_some_and(|n| updates >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    pb.finish_with_message(match handle.status() {
        Some(status) => describe(&status),
        None => "no status yet".to_string(),
    });

    if print_events {
        for line in handle.export_events() {
            println!("{line}");
        }
    }
    handle.stop().await;
    Ok(())
}

fn run_inspect(db: PathBuf, address: AccountAddress, bodies: bool) -> anyhow::Result<()> {
    let repository = open_repository(&db)?;
    let Some(status) = repository.load_status(&address)? else {
        println!("No status stored for {address}");
        return Ok(());
    };

    println!("Address:       {address}");
    println!("Balance:       {} nanoton", status.balance);
    println!("State:         {}", status.state.as_str());
    match &status.last_transaction {
        Some(id) => println!("Last tx:       {id}"),
        None => println!("Last tx:       none"),
    }
    println!("Sync time:     {}", status.sync_time);
    println!("Stored at:     {}", status.stored_at);
    match &status.transaction_cursor {
        Some(cursor) => println!("Cursor:        {cursor}"),
        None => println!("Cursor:        none (history complete)"),
    }
    println!("Loaded:        {}", status.loaded_transactions);

    for (lt, body) in repository.load_history(&address, &status)? {
        match (body, bodies) {
            (Some(body), true) => println!("  {:>20}  {body}", lt.0),
            (Some(body), false) => println!("  {:>20}  {} bytes", lt.0, body.len()),
            (None, _) => println!("  {:>20}  <missing>", lt.0),
        }
    }
    Ok(())
}

fn run_wipe(db: PathBuf, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to wipe {} without --yes", db.display());
    }
    open_repository(&db)?.wipe()?;
    info!("Wiped {}", db.display());
    Ok(())
}
