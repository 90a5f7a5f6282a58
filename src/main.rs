use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use storefront_settlement::application::engine::SettlementEngine;
use storefront_settlement::config::{DEFAULT_REFERENCE_PREFIX, SettlementConfig};
use storefront_settlement::domain::ports::{LedgerStoreBox, PaymentGatewayBox};
use storefront_settlement::infrastructure::gateway::SimulatedGateway;
use storefront_settlement::infrastructure::in_memory::InMemoryLedgerStore;
use storefront_settlement::interfaces::csv::referrer_writer::ReferrerWriter;
use storefront_settlement::interfaces::jsonl::command_reader::CommandReader;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input settlement commands, one JSON object per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "SETTLEMENT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// How long to wait for the payment gateway before treating a payment as pending
    #[arg(long, env = "SETTLEMENT_GATEWAY_TIMEOUT_MS", default_value_t = 10_000)]
    gateway_timeout_ms: u64,

    /// Prefix of generated payment references
    #[arg(long, env = "SETTLEMENT_REFERENCE_PREFIX", default_value = DEFAULT_REFERENCE_PREFIX)]
    reference_prefix: String,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreBox> {
    use storefront_settlement::infrastructure::rocksdb::RocksDbLedgerStore;

    match db_path {
        Some(path) => Ok(Box::new(RocksDbLedgerStore::open(path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreBox> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "storefront_settlement=info".to_string()),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = SettlementConfig::default()
        .with_gateway_timeout(Duration::from_millis(cli.gateway_timeout_ms))
        .with_reference_prefix(cli.reference_prefix);
    let store = open_store(cli.db_path)?;
    let gateway = SimulatedGateway::new();
    let gateway_port: PaymentGatewayBox = Box::new(gateway.clone());
    let engine = SettlementEngine::new(store, gateway_port, config);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(err) = command.execute(&engine, &gateway).await {
                    error!(%err, "Error processing command");
                }
            }
            Err(err) => {
                error!(%err, "Error reading command");
            }
        }
    }

    let referrers = engine.referrers().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = ReferrerWriter::new(stdout.lock());
    writer.write_referrers(&referrers).into_diagnostic()?;

    Ok(())
}
