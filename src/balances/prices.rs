use crate::config::PriceConfig;
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::collections::HashMap;
use std::sync::Arc;

/// USD prices by token, ether priced separately
#[derive(Clone, Default)]
pub struct PriceCache {
    eth_usd: f64,
    tokens: Arc<HashMap<String, f64>>,
}

impl PriceCache {
    /// Seeds the cache from the `[prices]` config table
    ///
    /// Token keys are checksummed so lookups match stored addresses.
    pub fn from_config(config: &PriceConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|(address, price)| {
                let key = address
                    .parse::<Address>()
                    .map(|parsed| to_checksum(&parsed, None))
                    .unwrap_or_else(|_| address.clone());
                (key, *price)
            })
            .collect();

        Self {
            eth_usd: config.eth_usd,
            tokens: Arc::new(tokens),
        }
    }

    pub fn eth_usd(&self) -> f64 {
        self.eth_usd
    }

    pub fn token_usd(&self, token_address: &str) -> Option<f64> {
        self.tokens.get(token_address).copied()
    }
}
