use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Safe transaction operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    Call = 0,
    DelegateCall = 1,
    Create = 2,
}

impl From<Operation> for u8 {
    fn from(operation: Operation) -> Self {
        operation as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            2 => Ok(Operation::Create),
            other => Err(format!("\"{}\" is not a valid choice.", other)),
        }
    }
}

/// How an owner approved a multisig transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureType {
    ContractSignature = 0,
    ApprovedHash = 1,
    Eoa = 2,
    EthSign = 3,
}

impl SignatureType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SignatureType::ContractSignature),
            1 => Some(SignatureType::ApprovedHash),
            2 => Some(SignatureType::Eoa),
            3 => Some(SignatureType::EthSign),
            _ => None,
        }
    }
}

/// Owner confirmation attached to a multisig transaction
///
/// Confirmations are bound to transactions by safe tx hash, so they can be
/// indexed before or after the transaction itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisigConfirmation {
    pub owner: String,
    pub submission_date: DateTime<Utc>,
    pub transaction_hash: Option<String>,
    pub signature: Option<String>,
    pub signature_type: Option<SignatureType>,
}

/// Multisig transaction as exposed by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisigTransaction {
    pub safe: String,
    pub to: String,
    pub value: String,
    pub data: Option<String>,
    pub operation: Operation,
    pub gas_token: Option<String>,
    pub safe_tx_gas: String,
    pub base_gas: String,
    pub gas_price: String,
    pub refund_receiver: Option<String>,
    pub nonce: u64,
    pub execution_date: Option<DateTime<Utc>>,
    pub submission_date: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<String>,
    pub safe_tx_hash: String,
    pub executor: Option<String>,
    pub is_executed: bool,
    pub is_successful: Option<bool>,
    pub eth_gas_price: Option<String>,
    pub gas_used: Option<u64>,
    pub origin: Option<String>,
    pub confirmations_required: Option<u64>,
    pub confirmations: Vec<MultisigConfirmation>,
    pub signatures: Option<String>,
}

/// Incoming ether or ERC-20 transfer
///
/// `token_address` is `None` for ether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingTransfer {
    pub execution_date: DateTime<Utc>,
    pub block_number: u64,
    pub transaction_hash: String,
    pub to: String,
    pub value: String,
    pub token_address: Option<String>,
    pub from: String,
}

/// Transaction executed through an enabled Safe module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleTransaction {
    pub created: DateTime<Utc>,
    pub execution_date: DateTime<Utc>,
    pub block_number: u64,
    pub transaction_hash: String,
    pub safe: String,
    pub module: String,
    pub to: String,
    pub value: String,
    pub data: Option<String>,
    pub operation: Operation,
}

/// Who deployed a Safe, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeCreationInfo {
    pub created: DateTime<Utc>,
    pub creator: String,
    pub transaction_hash: String,
}

/// Safes an address currently owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSafes {
    pub safes: Vec<String>,
}

/// ERC-20 metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Balance of ether (`token_address` = None) or of a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub token_address: Option<String>,
    pub token: Option<TokenInfo>,
    pub balance: String,
}

/// Balance with its USD valuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsdBalance {
    pub token_address: Option<String>,
    pub token: Option<TokenInfo>,
    pub balance: String,
    pub balance_usd: f64,
}
