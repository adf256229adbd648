//! Read side of the transaction store
//!
//! Every list query runs twice over the same `WHERE` clause: once for the
//! total `count` and once for the requested page.

use super::database::{Database, decode_timestamp, hash_hex, parent_trace_address};
use super::filters::{IncomingTransferFilter, MultisigTransactionFilter, Ordering, PageRequest};
use super::models::SafeStatus;
use crate::types::{
    IncomingTransfer, ModuleTransaction, MultisigConfirmation, MultisigTransaction, Operation,
    SafeCreationInfo, SignatureType,
};
use anyhow::{Result, anyhow};
use ethers::types::H256;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use tracing::debug;

/// Fields accepted by `ordering` on the multisig transaction list
pub const MULTISIG_ORDERING_FIELDS: &[(&str, &str)] = &[("nonce", "m.nonce"), ("created", "m.created")];
pub const MULTISIG_DEFAULT_ORDERING: &str = "-nonce,-created";

/// Fields accepted by `ordering` on the module transaction list
pub const MODULE_ORDERING_FIELDS: &[(&str, &str)] = &[("created", "mt.created")];
pub const MODULE_DEFAULT_ORDERING: &str = "-created";

const MULTISIG_SELECT: &str = r#"
SELECT m.safe_tx_hash, m.safe, m.ethereum_tx_hash, m.to_address, m.value, m.data, m.operation,
       m.safe_tx_gas, m.base_gas, m.gas_price, m.gas_token, m.refund_receiver, m.signatures,
       m.nonce, m.origin, m.created, m.modified,
       t.block_number, t.from_address AS executor, t.gas_price AS eth_gas_price,
       t.gas_used, t.status, b.timestamp AS execution_date,
       (SELECT ss.threshold FROM safe_status ss
         WHERE ss.address = m.safe AND ss.nonce = m.nonce
         ORDER BY ss.id DESC LIMIT 1) AS confirmations_required
FROM multisig_transaction m
LEFT JOIN ethereum_tx t ON t.tx_hash = m.ethereum_tx_hash
LEFT JOIN ethereum_block b ON b.number = t.block_number
"#;

const MODULE_SELECT: &str = r#"
SELECT mt.created, b.timestamp AS execution_date, t.block_number,
       i.ethereum_tx_hash AS transaction_hash, mt.safe, mt.module, mt.to_address,
       mt.value, mt.data, mt.operation
FROM module_transaction mt
JOIN internal_tx i ON i.id = mt.internal_tx_id
JOIN ethereum_tx t ON t.tx_hash = i.ethereum_tx_hash
JOIN ethereum_block b ON b.number = t.block_number
"#;

const INCOMING_COLUMNS: &str =
    "execution_date, block_number, transaction_hash, to_address, value, token_address, from_address";

impl Database {
    /// Page of a Safe's multisig transactions together with the filtered total
    pub async fn list_multisig_transactions(
        &self,
        safe: &str,
        filter: &MultisigTransactionFilter,
        ordering: &Ordering,
        page: PageRequest,
    ) -> Result<(u64, Vec<MultisigTransaction>)> {
        let mut count_query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM multisig_transaction m WHERE m.safe = ");
        count_query.push_bind(safe.to_string());
        filter.push_conditions(&mut count_query);
        let count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(MULTISIG_SELECT);
        query.push(" WHERE m.safe = ").push_bind(safe.to_string());
        filter.push_conditions(&mut query);
        ordering.push_order_by(&mut query, "m.safe_tx_hash DESC");
        push_page(&mut query, page);

        let rows = query.build().fetch_all(&self.pool).await?;
        let transactions = self.multisig_from_rows(rows).await?;
        debug!(
            "Multisig transactions for {}: {} of {} (offset {})",
            safe,
            transactions.len(),
            count,
            page.offset
        );
        Ok((count as u64, transactions))
    }

    /// Number of distinct nonces over every multisig transaction of a Safe
    pub async fn count_unique_nonce(&self, safe: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT nonce) FROM multisig_transaction WHERE safe = ?")
                .bind(safe)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    pub async fn get_multisig_transaction(&self, safe_tx_hash: &H256) -> Result<Option<MultisigTransaction>> {
        let mut query = QueryBuilder::<Sqlite>::new(MULTISIG_SELECT);
        query
            .push(" WHERE m.safe_tx_hash = ")
            .push_bind(hash_hex(safe_tx_hash));

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(self.multisig_from_rows(rows).await?.into_iter().next())
    }

    /// Executing ethereum tx of a stored multisig transaction
    ///
    /// `None` if the transaction is unknown, `Some(None)` if it is pending.
    pub async fn multisig_execution(&self, safe_tx_hash: &H256) -> Result<Option<Option<String>>> {
        let row = sqlx::query("SELECT ethereum_tx_hash FROM multisig_transaction WHERE safe_tx_hash = ?")
            .bind(hash_hex(safe_tx_hash))
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("ethereum_tx_hash")?),
            None => None,
        })
    }

    /// Confirmations for each of `safe_tx_hashes`, oldest first
    pub async fn list_confirmations(
        &self,
        safe_tx_hashes: &[String],
    ) -> Result<HashMap<String, Vec<MultisigConfirmation>>> {
        let mut confirmations: HashMap<String, Vec<MultisigConfirmation>> = HashMap::new();
        if safe_tx_hashes.is_empty() {
            return Ok(confirmations);
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT multisig_transaction_hash, owner, ethereum_tx_hash, signature, signature_type, created \
             FROM multisig_confirmation WHERE multisig_transaction_hash IN (",
        );
        let mut separated = query.separated(", ");
        for hash in safe_tx_hashes {
            separated.push_bind(hash.clone());
        }
        query.push(") ORDER BY created ASC, id ASC");

        for row in query.build().fetch_all(&self.pool).await? {
            let hash: String = row.try_get("multisig_transaction_hash")?;
            let signature_type: Option<i64> = row.try_get("signature_type")?;
            let created: String = row.try_get("created")?;
            confirmations.entry(hash).or_default().push(MultisigConfirmation {
                owner: row.try_get("owner")?,
                submission_date: decode_timestamp(&created)?,
                transaction_hash: row.try_get("ethereum_tx_hash")?,
                signature: row.try_get("signature")?,
                signature_type: signature_type.and_then(SignatureType::from_i64),
            });
        }
        Ok(confirmations)
    }

    async fn multisig_from_rows(&self, rows: Vec<SqliteRow>) -> Result<Vec<MultisigTransaction>> {
        let hashes = rows
            .iter()
            .map(|row| row.try_get::<String, _>("safe_tx_hash"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut confirmations = self.list_confirmations(&hashes).await?;

        rows.iter()
            .map(|row| -> Result<MultisigTransaction> {
                let mut tx = multisig_from_row(row)?;
                tx.confirmations = confirmations.remove(&tx.safe_tx_hash).unwrap_or_default();
                Ok(tx)
            })
            .collect()
    }

    /// Page of ether and token transfers received by `address`, newest first
    pub async fn list_incoming_transfers(
        &self,
        address: &str,
        filter: &IncomingTransferFilter,
        page: PageRequest,
    ) -> Result<(u64, Vec<IncomingTransfer>)> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        push_incoming_source(&mut count_query, address);
        filter.push_conditions(&mut count_query);
        let count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM ", INCOMING_COLUMNS));
        push_incoming_source(&mut query, address);
        filter.push_conditions(&mut query);
        query.push(" ORDER BY block_number DESC, transaction_hash DESC, token_address ASC");
        push_page(&mut query, page);

        let transfers = query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(incoming_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((count as u64, transfers))
    }

    pub async fn list_module_transactions(
        &self,
        safe: &str,
        ordering: &Ordering,
        page: PageRequest,
    ) -> Result<(u64, Vec<ModuleTransaction>)> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM module_transaction mt
            JOIN internal_tx i ON i.id = mt.internal_tx_id
            JOIN ethereum_tx t ON t.tx_hash = i.ethereum_tx_hash
            JOIN ethereum_block b ON b.number = t.block_number
            WHERE mt.safe = ?
            "#,
        )
        .bind(safe)
        .fetch_one(&self.pool)
        .await?;

        let mut query = QueryBuilder::<Sqlite>::new(MODULE_SELECT);
        query.push(" WHERE mt.safe = ").push_bind(safe.to_string());
        ordering.push_order_by(&mut query, "mt.internal_tx_id DESC");
        push_page(&mut query, page);

        let transactions = query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(module_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((count as u64, transactions))
    }

    /// Creation trace of the contract at `address`
    ///
    /// The creator is whoever issued the call that performed the creation
    /// (e.g. the account calling a proxy factory). Top level creations fall
    /// back to the sender of the creation itself.
    pub async fn safe_creation(&self, address: &str) -> Result<Option<SafeCreationInfo>> {
        let row = sqlx::query(
            r#"
            SELECT i.ethereum_tx_hash, i.trace_address, i.from_address, b.timestamp
            FROM internal_tx i
            JOIN ethereum_tx t ON t.tx_hash = i.ethereum_tx_hash
            JOIN ethereum_block b ON b.number = t.block_number
            WHERE i.contract_address = ?
            ORDER BY i.id ASC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let transaction_hash: String = row.try_get("ethereum_tx_hash")?;
        let trace_address: String = row.try_get("trace_address")?;
        let timestamp: String = row.try_get("timestamp")?;
        let mut creator: String = row.try_get("from_address")?;

        if let Some(parent) = parent_trace_address(&trace_address) {
            let parent_from: Option<String> = sqlx::query_scalar(
                "SELECT from_address FROM internal_tx WHERE ethereum_tx_hash = ? AND trace_address = ?",
            )
            .bind(transaction_hash.clone())
            .bind(parent)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(parent_from) = parent_from {
                creator = parent_from;
            }
        }

        Ok(Some(SafeCreationInfo {
            created: decode_timestamp(&timestamp)?,
            creator,
            transaction_hash,
        }))
    }

    pub async fn safe_contract_exists(&self, address: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM safe_contract WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Latest known status of a Safe: highest nonce, newest row on ties
    pub async fn last_safe_status(&self, address: &str) -> Result<Option<SafeStatus>> {
        let row = sqlx::query(
            r#"
            SELECT address, owners, threshold, nonce, master_copy FROM safe_status
            WHERE address = ?
            ORDER BY nonce DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(status_from_row).transpose()
    }

    /// Safes whose latest status lists `owner` among its owners
    pub async fn safes_for_owner(&self, owner: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT s.address, s.owners, s.threshold, s.nonce, s.master_copy FROM safe_status s
            WHERE s.id = (
                SELECT s2.id FROM safe_status s2
                WHERE s2.address = s.address
                ORDER BY s2.nonce DESC, s2.id DESC
                LIMIT 1
            )
            AND instr(s.owners, ?) > 0
            ORDER BY s.address
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let mut safes = Vec::new();
        for row in &rows {
            let status = status_from_row(row)?;
            if status.owners.iter().any(|o| o == owner) {
                safes.push(status.address);
            }
        }
        Ok(safes)
    }

    /// Tokens ever transferred to `address`
    pub async fn received_tokens(&self, address: &str) -> Result<Vec<String>> {
        let tokens: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT token_address FROM token_transfer WHERE to_address = ? ORDER BY token_address",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

fn push_page(builder: &mut QueryBuilder<'_, Sqlite>, page: PageRequest) {
    builder
        .push(" LIMIT ")
        .push_bind(page.limit as i64)
        .push(" OFFSET ")
        .push_bind(page.offset as i64);
}

/// `( ether UNION ALL tokens ) AS incoming WHERE 1 = 1`
fn push_incoming_source(builder: &mut QueryBuilder<'_, Sqlite>, address: &str) {
    builder.push(
        r#"(
        SELECT b.timestamp AS execution_date, t.block_number AS block_number,
               i.ethereum_tx_hash AS transaction_hash, i.to_address AS to_address,
               i.value AS value, NULL AS token_address, i.from_address AS from_address
        FROM internal_tx i
        JOIN ethereum_tx t ON t.tx_hash = i.ethereum_tx_hash
        JOIN ethereum_block b ON b.number = t.block_number
        WHERE i.value != '0' AND i.error IS NULL AND i.to_address = "#,
    );
    builder.push_bind(address.to_string());
    builder.push(
        r#"
        UNION ALL
        SELECT b.timestamp, t.block_number, e.ethereum_tx_hash, e.to_address,
               e.value, e.token_address, e.from_address
        FROM token_transfer e
        JOIN ethereum_tx t ON t.tx_hash = e.ethereum_tx_hash
        JOIN ethereum_block b ON b.number = t.block_number
        WHERE e.to_address = "#,
    );
    builder.push_bind(address.to_string());
    builder.push(") AS incoming WHERE 1 = 1");
}

fn operation_from_row(row: &SqliteRow) -> Result<Operation> {
    let operation: i64 = row.try_get("operation")?;
    u8::try_from(operation)
        .map_err(|_| anyhow!("invalid operation {}", operation))
        .and_then(|op| Operation::try_from(op).map_err(|e| anyhow!(e)))
}

fn multisig_from_row(row: &SqliteRow) -> Result<MultisigTransaction> {
    let ethereum_tx_hash: Option<String> = row.try_get("ethereum_tx_hash")?;
    let block_number: Option<i64> = row.try_get("block_number")?;
    let status: Option<i64> = row.try_get("status")?;
    let gas_used: Option<i64> = row.try_get("gas_used")?;
    let nonce: i64 = row.try_get("nonce")?;
    let confirmations_required: Option<i64> = row.try_get("confirmations_required")?;
    let execution_date: Option<String> = row.try_get("execution_date")?;
    let created: String = row.try_get("created")?;
    let modified: String = row.try_get("modified")?;
    let is_executed = ethereum_tx_hash.is_some();

    Ok(MultisigTransaction {
        safe: row.try_get("safe")?,
        to: row.try_get("to_address")?,
        value: row.try_get("value")?,
        data: row.try_get("data")?,
        operation: operation_from_row(row)?,
        gas_token: row.try_get("gas_token")?,
        safe_tx_gas: row.try_get("safe_tx_gas")?,
        base_gas: row.try_get("base_gas")?,
        gas_price: row.try_get("gas_price")?,
        refund_receiver: row.try_get("refund_receiver")?,
        nonce: nonce as u64,
        execution_date: execution_date.as_deref().map(decode_timestamp).transpose()?,
        submission_date: decode_timestamp(&created)?,
        modified: decode_timestamp(&modified)?,
        block_number: block_number.map(|n| n as u64),
        transaction_hash: ethereum_tx_hash,
        safe_tx_hash: row.try_get("safe_tx_hash")?,
        executor: row.try_get("executor")?,
        is_executed,
        is_successful: if is_executed { status.map(|s| s == 1) } else { None },
        eth_gas_price: row.try_get("eth_gas_price")?,
        gas_used: gas_used.map(|g| g as u64),
        origin: row.try_get("origin")?,
        confirmations_required: confirmations_required.map(|t| t as u64),
        confirmations: Vec::new(),
        signatures: row.try_get("signatures")?,
    })
}

fn incoming_from_row(row: &SqliteRow) -> Result<IncomingTransfer> {
    let execution_date: String = row.try_get("execution_date")?;
    let block_number: i64 = row.try_get("block_number")?;

    Ok(IncomingTransfer {
        execution_date: decode_timestamp(&execution_date)?,
        block_number: block_number as u64,
        transaction_hash: row.try_get("transaction_hash")?,
        to: row.try_get("to_address")?,
        value: row.try_get("value")?,
        token_address: row.try_get("token_address")?,
        from: row.try_get("from_address")?,
    })
}

fn module_from_row(row: &SqliteRow) -> Result<ModuleTransaction> {
    let created: String = row.try_get("created")?;
    let execution_date: String = row.try_get("execution_date")?;
    let block_number: i64 = row.try_get("block_number")?;

    Ok(ModuleTransaction {
        created: decode_timestamp(&created)?,
        execution_date: decode_timestamp(&execution_date)?,
        block_number: block_number as u64,
        transaction_hash: row.try_get("transaction_hash")?,
        safe: row.try_get("safe")?,
        module: row.try_get("module")?,
        to: row.try_get("to_address")?,
        value: row.try_get("value")?,
        data: row.try_get("data")?,
        operation: operation_from_row(row)?,
    })
}

fn status_from_row(row: &SqliteRow) -> Result<SafeStatus> {
    let owners: String = row.try_get("owners")?;
    let threshold: i64 = row.try_get("threshold")?;
    let nonce: i64 = row.try_get("nonce")?;

    Ok(SafeStatus {
        address: row.try_get("address")?,
        owners: serde_json::from_str(&owners)?,
        threshold: threshold as u64,
        nonce: nonce as u64,
        master_copy: row.try_get("master_copy")?,
    })
}
