//! Transaction Store Module
//!
//! SQLite backed store holding the chain data materialised by the indexer
//! (blocks, transactions, traces, token transfers, Safe statuses) together
//! with the multisig transactions and confirmations proposed through the API.
//!
//! # Storage conventions
//! - Addresses are EIP-55 checksummed strings
//! - Hashes and byte strings are lowercase `0x` hex
//! - uint256 quantities are decimal strings
//! - Timestamps are fixed width RFC 3339 strings so they sort lexically

use super::models::{
    NewEthereumBlock, NewEthereumTx, NewInternalTx, NewModuleTransaction, NewMultisigConfirmation,
    NewMultisigTransaction, NewSafeContract, NewSafeStatus, NewTokenTransfer,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use ethers::utils::{hex, to_checksum};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ethereum_block (
    number INTEGER PRIMARY KEY,
    block_hash TEXT NOT NULL UNIQUE,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ethereum_tx (
    tx_hash TEXT PRIMARY KEY,
    block_number INTEGER,
    from_address TEXT NOT NULL,
    to_address TEXT,
    gas_price TEXT NOT NULL,
    gas_used INTEGER,
    status INTEGER
);

CREATE TABLE IF NOT EXISTS internal_tx (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ethereum_tx_hash TEXT NOT NULL,
    trace_address TEXT NOT NULL,
    from_address TEXT NOT NULL,
    to_address TEXT,
    value TEXT NOT NULL,
    call_type TEXT,
    tx_type TEXT NOT NULL,
    contract_address TEXT,
    error TEXT,
    UNIQUE (ethereum_tx_hash, trace_address)
);
CREATE INDEX IF NOT EXISTS internal_tx_to_idx ON internal_tx (to_address);
CREATE INDEX IF NOT EXISTS internal_tx_contract_idx ON internal_tx (contract_address);

CREATE TABLE IF NOT EXISTS token_transfer (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ethereum_tx_hash TEXT NOT NULL,
    log_index INTEGER NOT NULL,
    token_address TEXT NOT NULL,
    from_address TEXT NOT NULL,
    to_address TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE (ethereum_tx_hash, log_index)
);
CREATE INDEX IF NOT EXISTS token_transfer_to_idx ON token_transfer (to_address);

CREATE TABLE IF NOT EXISTS safe_contract (
    address TEXT PRIMARY KEY,
    ethereum_tx_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS safe_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    internal_tx_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    owners TEXT NOT NULL,
    threshold INTEGER NOT NULL,
    nonce INTEGER NOT NULL,
    master_copy TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS safe_status_address_idx ON safe_status (address, nonce);

CREATE TABLE IF NOT EXISTS module_transaction (
    internal_tx_id INTEGER PRIMARY KEY,
    safe TEXT NOT NULL,
    module TEXT NOT NULL,
    to_address TEXT NOT NULL,
    value TEXT NOT NULL,
    data TEXT,
    operation INTEGER NOT NULL,
    created TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS module_transaction_safe_idx ON module_transaction (safe);

CREATE TABLE IF NOT EXISTS multisig_transaction (
    safe_tx_hash TEXT PRIMARY KEY,
    safe TEXT NOT NULL,
    ethereum_tx_hash TEXT,
    to_address TEXT NOT NULL,
    value TEXT NOT NULL,
    data TEXT,
    operation INTEGER NOT NULL,
    safe_tx_gas TEXT NOT NULL,
    base_gas TEXT NOT NULL,
    gas_price TEXT NOT NULL,
    gas_token TEXT,
    refund_receiver TEXT,
    signatures TEXT,
    nonce INTEGER NOT NULL,
    origin TEXT,
    created TEXT NOT NULL,
    modified TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS multisig_transaction_safe_idx ON multisig_transaction (safe, nonce);

CREATE TABLE IF NOT EXISTS multisig_confirmation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    multisig_transaction_hash TEXT NOT NULL,
    owner TEXT NOT NULL,
    ethereum_tx_hash TEXT,
    signature TEXT,
    signature_type INTEGER,
    created TEXT NOT NULL,
    UNIQUE (multisig_transaction_hash, owner)
);
"#;

/// Handle to the transaction store
///
/// Cheap to clone; all clones share the same connection pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Connects to the database at `url`, creating the file and the schema
    /// if they do not exist yet
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.setup_schema().await?;
        info!("Connected to transaction store at {}", url);
        Ok(db)
    }

    /// Opens a private in-memory store
    ///
    /// A single connection is kept alive for the lifetime of the pool, since
    /// every new SQLite memory connection starts from an empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.setup_schema().await?;
        Ok(db)
    }

    async fn setup_schema(&self) -> Result<()> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }

    pub async fn insert_block(&self, block: &NewEthereumBlock) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO ethereum_block (number, block_hash, timestamp) VALUES (?, ?, ?)",
        )
        .bind(block.number as i64)
        .bind(hash_hex(&block.block_hash))
        .bind(encode_timestamp(&block.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_ethereum_tx(&self, tx: &NewEthereumTx) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO ethereum_tx
                (tx_hash, block_number, from_address, to_address, gas_price, gas_used, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash_hex(&tx.tx_hash))
        .bind(tx.block_number.map(|n| n as i64))
        .bind(checksum(&tx.from))
        .bind(tx.to.as_ref().map(checksum))
        .bind(tx.gas_price.to_string())
        .bind(tx.gas_used.map(|g| g as i64))
        .bind(tx.status.map(i64::from))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores a trace and returns its row id
    pub async fn insert_internal_tx(&self, internal_tx: &NewInternalTx) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO internal_tx
                (ethereum_tx_hash, trace_address, from_address, to_address, value,
                 call_type, tx_type, contract_address, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash_hex(&internal_tx.ethereum_tx_hash))
        .bind(encode_trace_address(&internal_tx.trace_address))
        .bind(checksum(&internal_tx.from))
        .bind(internal_tx.to.as_ref().map(checksum))
        .bind(internal_tx.value.to_string())
        .bind(internal_tx.call_type.as_deref())
        .bind(internal_tx.tx_type.as_str())
        .bind(internal_tx.contract_address.as_ref().map(checksum))
        .bind(internal_tx.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_token_transfer(&self, transfer: &NewTokenTransfer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO token_transfer
                (ethereum_tx_hash, log_index, token_address, from_address, to_address, value)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash_hex(&transfer.ethereum_tx_hash))
        .bind(transfer.log_index as i64)
        .bind(checksum(&transfer.token_address))
        .bind(checksum(&transfer.from))
        .bind(checksum(&transfer.to))
        .bind(transfer.value.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_safe_contract(&self, contract: &NewSafeContract) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO safe_contract (address, ethereum_tx_hash) VALUES (?, ?)")
            .bind(checksum(&contract.address))
            .bind(hash_hex(&contract.ethereum_tx_hash))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_safe_status(&self, status: &NewSafeStatus) -> Result<()> {
        let owners: Vec<String> = status.owners.iter().map(checksum).collect();
        sqlx::query(
            r#"
            INSERT INTO safe_status (internal_tx_id, address, owners, threshold, nonce, master_copy)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(status.internal_tx_id)
        .bind(checksum(&status.address))
        .bind(serde_json::to_string(&owners)?)
        .bind(status.threshold as i64)
        .bind(status.nonce as i64)
        .bind(checksum(&status.master_copy))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_module_transaction(&self, module_tx: &NewModuleTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO module_transaction
                (internal_tx_id, safe, module, to_address, value, data, operation, created)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(module_tx.internal_tx_id)
        .bind(checksum(&module_tx.safe))
        .bind(checksum(&module_tx.module))
        .bind(checksum(&module_tx.to))
        .bind(module_tx.value.to_string())
        .bind(module_tx.data.as_deref().map(bytes_hex))
        .bind(u8::from(module_tx.operation) as i64)
        .bind(encode_timestamp(&module_tx.created))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts a multisig transaction unless one with the same safe tx hash
    /// exists. Returns whether a row was created.
    pub async fn insert_multisig_transaction(&self, tx: &NewMultisigTransaction) -> Result<bool> {
        insert_multisig_transaction_on(&self.pool, tx).await
    }

    /// Inserts a confirmation unless the owner already confirmed that hash.
    /// Returns whether a row was created.
    pub async fn insert_confirmation(&self, confirmation: &NewMultisigConfirmation) -> Result<bool> {
        insert_confirmation_on(&self.pool, confirmation).await
    }

    /// Stores a proposed multisig transaction and its confirmations atomically
    pub async fn store_multisig_submission(
        &self,
        tx: &NewMultisigTransaction,
        confirmations: &[NewMultisigConfirmation],
    ) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        let created = insert_multisig_transaction_on(&mut *db_tx, tx).await?;
        let mut confirmed = 0;
        for confirmation in confirmations {
            if insert_confirmation_on(&mut *db_tx, confirmation).await? {
                confirmed += 1;
            }
        }

        db_tx.commit().await?;
        debug!(
            "Stored multisig tx {:?} (new={}) with {} new confirmations",
            tx.safe_tx_hash, created, confirmed
        );
        Ok(())
    }
}

async fn insert_multisig_transaction_on<'e, E>(executor: E, tx: &NewMultisigTransaction) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let created = encode_timestamp(&tx.created);
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO multisig_transaction
            (safe_tx_hash, safe, ethereum_tx_hash, to_address, value, data, operation,
             safe_tx_gas, base_gas, gas_price, gas_token, refund_receiver, signatures,
             nonce, origin, created, modified)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(hash_hex(&tx.safe_tx_hash))
    .bind(checksum(&tx.safe))
    .bind(tx.ethereum_tx_hash.as_ref().map(hash_hex))
    .bind(checksum(&tx.to))
    .bind(tx.value.to_string())
    .bind(tx.data.as_deref().map(bytes_hex))
    .bind(u8::from(tx.operation) as i64)
    .bind(tx.safe_tx_gas.to_string())
    .bind(tx.base_gas.to_string())
    .bind(tx.gas_price.to_string())
    .bind(tx.gas_token.as_ref().map(checksum))
    .bind(tx.refund_receiver.as_ref().map(checksum))
    .bind(tx.signatures.as_deref().map(bytes_hex))
    .bind(tx.nonce as i64)
    .bind(tx.origin.as_deref())
    .bind(created.clone())
    .bind(created)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_confirmation_on<'e, E>(executor: E, confirmation: &NewMultisigConfirmation) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO multisig_confirmation
            (multisig_transaction_hash, owner, ethereum_tx_hash, signature, signature_type, created)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(hash_hex(&confirmation.multisig_transaction_hash))
    .bind(checksum(&confirmation.owner))
    .bind(confirmation.ethereum_tx_hash.as_ref().map(hash_hex))
    .bind(confirmation.signature.as_deref().map(bytes_hex))
    .bind(confirmation.signature_type.map(|t| t as i64))
    .bind(encode_timestamp(&confirmation.created))
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

pub(crate) fn hash_hex(hash: &H256) -> String {
    format!("{:?}", hash)
}

pub(crate) fn bytes_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub(crate) fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn encode_trace_address(trace_address: &[u32]) -> String {
    trace_address
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Trace address of the call that produced `trace_address`, `None` for the
/// top level call
pub(crate) fn parent_trace_address(trace_address: &str) -> Option<String> {
    if trace_address.is_empty() {
        return None;
    }
    Some(match trace_address.rsplit_once(',') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1);

        assert!(encode_timestamp(&early) < encode_timestamp(&late));
        assert_eq!(decode_timestamp(&encode_timestamp(&late)).unwrap(), late);
    }

    #[test]
    fn test_parent_trace_address() {
        assert_eq!(parent_trace_address(""), None);
        assert_eq!(parent_trace_address("0"), Some(String::new()));
        assert_eq!(parent_trace_address("0,3,1"), Some("0,3".to_string()));
    }

    #[test]
    fn test_trace_address_encoding() {
        assert_eq!(encode_trace_address(&[]), "");
        assert_eq!(encode_trace_address(&[0, 2]), "0,2");
    }
}
