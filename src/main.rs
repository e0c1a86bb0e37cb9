use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::{signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

use address_indexer::gateway::EtherscanClient;
use address_indexer::indexer::{AddressIndexer, SyncReport};
use address_indexer::metrics::Metrics;
use address_indexer::models::events::EventKind;
use address_indexer::storage::EventStore;
use address_indexer::utils::load_config;

#[derive(Parser)]
#[command(author, version, about = "Mirror an address's on-chain activity into a local store")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new events for one kind, or for every kind
    Sync {
        #[arg(long)]
        kind: Option<EventKind>,
    },
    /// Print the cached events of a kind
    Events {
        #[arg(long)]
        kind: EventKind,
    },
    /// Print current token holdings rebuilt from cached transfers
    Holdings { standard: TokenStandard },
    /// Print the native-currency balance
    Balance,
    /// Sync every kind periodically until Ctrl+C
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
    /// Delete cached events
    Drop {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        kind: Option<EventKind>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TokenStandard {
    Erc20,
    Erc721,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_json(report: &SyncReport) -> Value {
    let mut out = serde_json::Map::new();
    for (kind, outcome) in &report.outcomes {
        let entry = match outcome {
            Ok(sync) => json!(sync),
            Err(e) => json!({ "kind": kind, "error": e.to_string() }),
        };
        out.insert(kind.to_string(), entry);
    }
    Value::Object(out)
}

fn ensure_success(report: &SyncReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }
    let failed: Vec<String> = report.failed_kinds().iter().map(|k| k.to_string()).collect();
    Err(anyhow!("sync failed for: {}", failed.join(", ")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let network = config.network()?;
    info!("Indexing {} on {}", config.address, network);

    let metrics = if config.metrics.enabled {
        let metrics = Metrics::new(network.to_string())?;
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await
            .context("failed to start metrics server")?;
        Some(metrics)
    } else {
        None
    };

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let store = EventStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let gateway = EtherscanClient::from_config(&config, metrics.clone())?;
    let indexer = AddressIndexer::new(network, &config.address, gateway, store.clone())?
        .with_page_size(config.page_size)
        .with_metrics(metrics);

    let result = run(&indexer, cli.cmd).await;
    store.close().await;
    result
}

async fn run(indexer: &AddressIndexer<EtherscanClient>, cmd: Command) -> Result<()> {
    match cmd {
        Command::Sync { kind: Some(kind) } => {
            let sync = indexer.sync(kind).await?;
            print_json(&sync)
        }
        Command::Sync { kind: None } => {
            let report = indexer.sync_all().await;
            print_json(&report_json(&report))?;
            ensure_success(&report)
        }
        Command::Events { kind } => print_json(&indexer.get_cached_events(kind).await?),
        Command::Holdings {
            standard: TokenStandard::Erc20,
        } => print_json(&indexer.get_erc20_holdings().await?),
        Command::Holdings {
            standard: TokenStandard::Erc721,
        } => print_json(&indexer.get_erc721_holdings().await?),
        Command::Balance => {
            let balance = indexer.get_balance().await?;
            print_json(&json!({ "address": indexer.address(), "balance": balance }))
        }
        Command::Watch { interval_secs } => watch_loop(indexer, interval_secs).await,
        Command::Drop { kind: Some(kind), .. } => {
            indexer.drop(kind).await?;
            info!("Dropped cached {} events", kind);
            Ok(())
        }
        Command::Drop { kind: None, .. } => {
            indexer.drop_all().await?;
            info!("Dropped all cached events for {}", indexer.address());
            Ok(())
        }
    }
}

async fn watch_loop(indexer: &AddressIndexer<EtherscanClient>, interval_secs: u64) -> Result<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    // A pass in progress always completes before shutting down
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, finishing current pass...");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Watching every {}s", interval.as_secs());
    loop {
        let report = indexer.sync_all().await;
        if report.is_success() {
            info!("Pass complete: {} new events", report.stored());
        } else {
            error!("Pass finished with failures:\n{}", report);
        }

        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            Ok(()) = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Shutting down");
    Ok(())
}
