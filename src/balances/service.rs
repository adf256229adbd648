use super::prices::PriceCache;
use crate::store::Database;
use crate::types::{Balance, TokenInfo, UsdBalance};
use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::abigen;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use std::sync::Arc;
use tracing::{debug, warn};

abigen!(
    Erc20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function decimals() external view returns (uint8)
        function name() external view returns (string)
        function symbol() external view returns (string)
    ]"#
);

const ETHER_DECIMALS: u8 = 18;

/// Source of Safe balances
///
/// Ether comes first with `token_address = None`, followed by the tokens.
#[async_trait]
pub trait BalanceService: Send + Sync {
    async fn get_balances(&self, address: Address) -> Result<Vec<Balance>>;

    async fn get_usd_balances(&self, address: Address) -> Result<Vec<UsdBalance>>;
}

/// Reads balances from an Ethereum node
///
/// Tokens are the ones the Safe has ever received according to the indexed
/// transfers. Tokens whose contract calls fail are left out.
pub struct RpcBalanceService {
    provider: Arc<Provider<Http>>,
    db: Database,
    prices: PriceCache,
}

impl RpcBalanceService {
    /// # Arguments
    /// * `node_url` - JSON-RPC endpoint of the Ethereum node
    /// * `db` - Store holding the indexed token transfers
    /// * `prices` - USD prices used by `get_usd_balances`
    pub fn new(node_url: &str, db: Database, prices: PriceCache) -> Result<Self> {
        let provider = Provider::<Http>::try_from(node_url)?;
        Ok(Self {
            provider: Arc::new(provider),
            db,
            prices,
        })
    }

    async fn token_balance(&self, token_address: Address, owner: Address) -> Result<Balance> {
        let token = Erc20::new(token_address, self.provider.clone());
        let balance = token.balance_of(owner).call().await?;
        let info = TokenInfo {
            name: token.name().call().await?,
            symbol: token.symbol().call().await?,
            decimals: token.decimals().call().await?,
        };
        Ok(Balance {
            token_address: Some(to_checksum(&token_address, None)),
            token: Some(info),
            balance: balance.to_string(),
        })
    }
}

#[async_trait]
impl BalanceService for RpcBalanceService {
    async fn get_balances(&self, address: Address) -> Result<Vec<Balance>> {
        let ether = self.provider.get_balance(address, None).await?;
        let mut balances = vec![Balance {
            token_address: None,
            token: None,
            balance: ether.to_string(),
        }];

        for token in self.db.received_tokens(&to_checksum(&address, None)).await? {
            let token_address = match token.parse::<Address>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping stored token {}: {}", token, e);
                    continue;
                }
            };
            match self.token_balance(token_address, address).await {
                Ok(balance) => balances.push(balance),
                Err(e) => warn!("Cannot read balance of token {}: {}", token, e),
            }
        }

        debug!("Found {} balances for {:?}", balances.len(), address);
        Ok(balances)
    }

    async fn get_usd_balances(&self, address: Address) -> Result<Vec<UsdBalance>> {
        let balances = self.get_balances(address).await?;
        let mut usd_balances = Vec::with_capacity(balances.len());

        for balance in balances {
            let (price, decimals) = match (&balance.token_address, &balance.token) {
                (Some(token_address), Some(token)) => (
                    self.prices.token_usd(token_address).unwrap_or(0.0),
                    token.decimals,
                ),
                _ => (self.prices.eth_usd(), ETHER_DECIMALS),
            };
            let amount = U256::from_dec_str(&balance.balance)?;
            usd_balances.push(UsdBalance {
                balance_usd: usd_value(amount, decimals, price),
                token_address: balance.token_address,
                token: balance.token,
                balance: balance.balance,
            });
        }

        Ok(usd_balances)
    }
}

/// `amount / 10^decimals * price`
pub fn usd_value(amount: U256, decimals: u8, price: f64) -> f64 {
    let whole = amount.to_string().parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals as i32);
    whole * price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_value_scales_by_decimals() {
        assert_eq!(usd_value(U256::exp10(18), 18, 1800.0), 1800.0);
        assert_eq!(usd_value(U256::from(2_500_000u64), 6, 1.0), 2.5);
        assert_eq!(usd_value(U256::zero(), 18, 1800.0), 0.0);
        assert_eq!(usd_value(U256::exp10(18), 18, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_node_url() {
        let db = Database::in_memory().await.unwrap();
        assert!(RpcBalanceService::new("not a url", db, PriceCache::default()).is_err());
    }
}
