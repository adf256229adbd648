//! Safe transaction service
//!
//! HTTP API over indexed Gnosis Safe data: multisig transaction history and
//! proposals, incoming transfers, module transactions, creation info,
//! balances and owners.

pub mod types; // API representations shared by the store and the handlers.
pub mod api; // HTTP routes, pagination and error mapping.
pub mod validation; // Checks multisig transaction proposals.
pub mod balances; // Ether and token balances of a Safe.
pub mod store; // SQLite store of the indexed data.
pub mod config; // Defines and loads system configuration.

pub use types::*;
pub use config::Config;
