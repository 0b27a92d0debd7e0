use cryptotrader::config::Config;
use cryptotrader::engine::Engine;
use cryptotrader::feeds::{CoinbaseExchange, ExchangeRegistry};
use cryptotrader::store::MemoryStore;
use cryptotrader::strategies::{AlgorithmRegistry, Trend};

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load and validate config (reads .env automatically)
    let (config, ignored) = Config::load_or_default();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logger.level));
    if config.logger.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    for message in &ignored {
        warn!("{message}");
    }

    info!("================================================");
    info!("  {} v{}", config.logger.prefix, env!("CARGO_PKG_VERSION"));
    info!("  Campaign trading engine");
    info!("================================================");

    if let Err(e) = config.validate() {
        error!("Config validation failed: {e}");
        return Err(e);
    }

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Store
    tokio::fs::create_dir_all(&config.database.path).await?;
    let store = Arc::new(MemoryStore::open(config.store_file()).await?);

    // Algorithms
    let mut algorithms = AlgorithmRegistry::new();
    algorithms.add(Arc::new(Trend::new(store.clone(), store.clone())));
    for (name, options) in algorithms.describe() {
        info!("Algorithm {name}: {}", serde_json::to_string(&options)?);
    }

    // Exchanges
    let gdax = Arc::new(CoinbaseExchange::new(
        "gdax",
        config.exchanges.gdax.clone(),
        config.engine.ticker_buffer,
    ));
    gdax.start(shutdown_tx.subscribe()).await;
    let mut exchanges = ExchangeRegistry::new();
    exchanges.add(gdax);

    // Engine
    let engine = Engine::new(
        config.engine.clone(),
        store.clone(),
        store.clone(),
        Arc::new(exchanges),
        Arc::new(algorithms),
    );
    engine.start().await?;

    info!("Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Cleaning up...");

    if let Err(e) = engine.stop().await {
        error!("Engine stop failed: {e}");
    }
    let _ = shutdown_tx.send(());

    info!("Shutdown complete.");
    Ok(())
}
