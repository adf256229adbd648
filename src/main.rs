use safe_transaction_service::{
    api::Server,
    balances::{PriceCache, RpcBalanceService},
    config::Config,
    store::Database,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Loads the configuration, opens the store and serves the API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from SAFE_CONFIG or the default file
    let config = Config::from_env()?;
    info!("Safe transaction service starting with config: {:?}", config);

    // Open the store and create the schema
    let db = Database::connect(&config.database.url).await?;

    // Balance lookups go to the configured node
    let prices = PriceCache::from_config(&config.prices);
    let balances = RpcBalanceService::new(&config.ethereum.node_url, db.clone(), prices)?;
    info!("Reading balances from {}", config.ethereum.node_url);

    // Create and start the API server
    let server = Server::new(config, db, Arc::new(balances));
    server.start().await?;

    Ok(())
}
