//! Rows written by the indexer
//!
//! These mirror the tables in [`super::database`]. Addresses are stored as
//! EIP-55 checksummed strings, hashes as lowercase `0x` hex and uint256
//! quantities as decimal strings.

use crate::types::{Operation, SignatureType};
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};

#[derive(Debug, Clone)]
pub struct NewEthereumBlock {
    pub number: u64,
    pub block_hash: H256,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEthereumTx {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub gas_price: U256,
    pub gas_used: Option<u64>,
    /// 1 for success, 0 for reverted
    pub status: Option<u8>,
}

/// Kind of trace recorded for an internal transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalTxType {
    Call,
    Create,
    SelfDestruct,
}

impl InternalTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InternalTxType::Call => "CALL",
            InternalTxType::Create => "CREATE",
            InternalTxType::SelfDestruct => "SELF_DESTRUCT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInternalTx {
    pub ethereum_tx_hash: H256,
    /// Position of the trace in the call tree, empty for the top level call
    pub trace_address: Vec<u32>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub call_type: Option<String>,
    pub tx_type: InternalTxType,
    pub contract_address: Option<Address>,
    pub error: Option<String>,
}

/// ERC-20 `Transfer` event
#[derive(Debug, Clone)]
pub struct NewTokenTransfer {
    pub ethereum_tx_hash: H256,
    pub log_index: u32,
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone)]
pub struct NewSafeContract {
    pub address: Address,
    pub ethereum_tx_hash: H256,
}

#[derive(Debug, Clone)]
pub struct NewSafeStatus {
    pub internal_tx_id: i64,
    pub address: Address,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub nonce: u64,
    pub master_copy: Address,
}

#[derive(Debug, Clone)]
pub struct NewModuleTransaction {
    pub internal_tx_id: i64,
    pub safe: Address,
    pub module: Address,
    pub to: Address,
    pub value: U256,
    pub data: Option<Vec<u8>>,
    pub operation: Operation,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMultisigTransaction {
    pub safe_tx_hash: H256,
    pub safe: Address,
    pub ethereum_tx_hash: Option<H256>,
    pub to: Address,
    pub value: U256,
    pub data: Option<Vec<u8>>,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Option<Address>,
    pub refund_receiver: Option<Address>,
    pub signatures: Option<Vec<u8>>,
    pub nonce: u64,
    pub origin: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMultisigConfirmation {
    pub multisig_transaction_hash: H256,
    pub owner: Address,
    pub ethereum_tx_hash: Option<H256>,
    pub signature: Option<Vec<u8>>,
    pub signature_type: Option<SignatureType>,
    pub created: DateTime<Utc>,
}

/// Snapshot of a Safe's configuration after a given nonce
#[derive(Debug, Clone, PartialEq)]
pub struct SafeStatus {
    pub address: String,
    pub owners: Vec<String>,
    pub threshold: u64,
    pub nonce: u64,
    pub master_copy: String,
}
