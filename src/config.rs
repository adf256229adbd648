//! Configuration Module
//!
//! This module defines all configuration structures for the transaction service.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;

/// Environment variable that overrides the configuration file path
pub const CONFIG_PATH_ENV: &str = "SAFE_CONFIG";

/// Environment variable that overrides `database.url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Configuration file used when `SAFE_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main configuration structure
///
/// Contains all configuration sections for the service.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [api]
/// host = "127.0.0.1"
/// port = 8888
///
/// [database]
/// url = "sqlite://safe.db"
///
/// [ethereum]
/// node_url = "http://localhost:8545"
/// tracing_node_url = "http://localhost:8545"
/// internal_txs_block_process_limit = 10000
/// reorg_blocks = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub ethereum: EthereumConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub prices: PriceConfig,
}

/// API server configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
///
/// # Fields
/// - `url`: Database connection URL (e.g., "sqlite://safe.db")
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Ethereum node and indexer settings
///
/// Only `node_url` is used by the API itself (balance lookups). The rest
/// describe how the indexer is deployed and are echoed by `/about/`.
#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub node_url: String,
    pub tracing_node_url: String,
    pub internal_txs_block_process_limit: u64,
    pub reorg_blocks: u64,
    #[serde(default)]
    pub uniswap_factory_address: Option<String>,
}

/// Limit/offset pagination defaults
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 200,
        }
    }
}

/// USD price table used to value balances
///
/// # Example TOML
/// ```toml
/// [prices]
/// eth_usd = 1800.0
///
/// [prices.tokens]
/// "0x6B175474E89094C44Da98b954EedeAC495271d0F" = 1.0
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceConfig {
    #[serde(default)]
    pub eth_usd: f64,
    /// Token address (checksummed) to USD price per whole token
    #[serde(default)]
    pub tokens: HashMap<String, f64>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration honouring the environment overrides
    ///
    /// `SAFE_CONFIG` selects the file, `DATABASE_URL` replaces `database.url`.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;

        if let Ok(url) = env::var(DATABASE_URL_ENV) {
            config.database.url = url;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [api]
        host = "0.0.0.0"
        port = 8888

        [database]
        url = "sqlite::memory:"

        [ethereum]
        node_url = "http://localhost:8545"
        tracing_node_url = "http://tracing:8545"
        internal_txs_block_process_limit = 10000
        reorg_blocks = 10

        [prices]
        eth_usd = 1800.5

        [prices.tokens]
        "0x6B175474E89094C44Da98b954EedeAC495271d0F" = 1.0
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.api.port, 8888);
        assert_eq!(config.ethereum.reorg_blocks, 10);
        assert_eq!(config.ethereum.uniswap_factory_address, None);
        assert_eq!(config.prices.eth_usd, 1800.5);
        assert_eq!(config.prices.tokens.len(), 1);
    }

    #[test]
    fn test_pagination_defaults_when_section_missing() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.pagination.default_limit, 100);
        assert_eq!(config.pagination.max_limit, 200);
    }

    #[test]
    fn test_missing_section_is_an_error() {
        assert!(Config::parse("[api]\nhost = \"x\"\nport = 1\n").is_err());
    }
}
