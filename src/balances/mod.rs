//! Balances Module
//!
//! Ether and ERC-20 balances of a Safe, optionally valued in USD.

mod prices;
mod service;

pub use prices::PriceCache;
pub use service::{BalanceService, RpcBalanceService, usd_value};
