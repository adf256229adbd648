//! Request handlers
//!
//! Address path parameters are checked before any store access: anything
//! else than a checksummed address is answered with 422.

use super::error::ApiError;
use super::pagination::{Page, RequestContext, page_request};
use super::server::AppState;
use crate::store::{
    IncomingTransferFilter, MODULE_DEFAULT_ORDERING, MODULE_ORDERING_FIELDS, MULTISIG_DEFAULT_ORDERING,
    MULTISIG_ORDERING_FIELDS, MultisigTransactionFilter, Ordering, QueryParams,
};
use crate::types::{Balance, MultisigTransaction, OwnerSafes, SafeCreationInfo, UsdBalance};
use crate::validation::{FieldErrors, MultisigTransactionSubmission, parse_checksum_address};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use ethers::types::{Address, H256};
use ethers::utils::{hex, to_checksum};
use serde_json::{Value, json};
use tracing::{debug, info};

const API_VERSION: &str = "v1";

fn checksum_path(address: &str) -> Result<Address, ApiError> {
    parse_checksum_address(address).ok_or(ApiError::InvalidAddress)
}

fn ordering(params: &QueryParams, allowed: &[(&str, &'static str)], default: &str) -> Ordering {
    Ordering::parse(params.get("ordering").map(String::as_str), allowed, default)
}

/// `GET /about/`
pub async fn about(State(state): State<AppState>, context: RequestContext) -> Json<Value> {
    let ethereum = &state.config.ethereum;
    Json(json!({
        "name": "Safe Transaction Service",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": API_VERSION,
        "secure": context.secure,
        "settings": {
            "ETHEREUM_NODE_URL": ethereum.node_url,
            "ETHEREUM_TRACING_NODE_URL": ethereum.tracing_node_url,
            "ETH_INTERNAL_TXS_BLOCK_PROCESS_LIMIT": ethereum.internal_txs_block_process_limit,
            "ETH_REORG_BLOCKS": ethereum.reorg_blocks,
            "ETH_UNISWAP_FACTORY_ADDRESS": ethereum.uniswap_factory_address,
        }
    }))
}

/// `GET /safes/{address}/transactions/`
pub async fn list_multisig_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<QueryParams>,
    context: RequestContext,
) -> Result<Response, ApiError> {
    let safe = to_checksum(&checksum_path(&address)?, None);
    let filter = MultisigTransactionFilter::from_query(&params).map_err(ApiError::BadRequest)?;
    let ordering = ordering(&params, MULTISIG_ORDERING_FIELDS, MULTISIG_DEFAULT_ORDERING);
    let page = page_request(&params, &state.config.pagination);

    let (count, transactions) = state
        .db
        .list_multisig_transactions(&safe, &filter, &ordering, page)
        .await?;
    let count_unique_nonce = state.db.count_unique_nonce(&safe).await?;
    debug!("Safe {} has {} multisig txs matching", safe, count);

    Page::new(count, transactions, page)
        .with("count_unique_nonce", count_unique_nonce)
        .into_response(&context)
}

/// `POST /safes/{address}/transactions/`
pub async fn create_multisig_transaction(
    State(state): State<AppState>,
    Path(address): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // The address is checked before the body is read
    let safe = checksum_path(&address)?;
    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        let mut errors = FieldErrors::new();
        errors.add_non_field(format!("JSON parse error - {}", e));
        ApiError::BadRequest(errors)
    })?;
    let submission = MultisigTransactionSubmission::from_json(safe, &body).map_err(ApiError::Validation)?;
    let validated = state.validator.validate(submission).await?;

    state
        .db
        .store_multisig_submission(&validated.transaction, &validated.confirmations)
        .await?;
    info!(
        "Stored multisig tx {:?} for safe {} with {} confirmations",
        validated.transaction.safe_tx_hash,
        address,
        validated.confirmations.len()
    );

    Ok(StatusCode::ACCEPTED)
}

/// `GET /safes/{address}/incoming-transactions/`
pub async fn list_incoming_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<QueryParams>,
    context: RequestContext,
) -> Result<Response, ApiError> {
    let safe = to_checksum(&checksum_path(&address)?, None);
    let filter = IncomingTransferFilter::from_query(&params).map_err(ApiError::BadRequest)?;
    let page = page_request(&params, &state.config.pagination);

    let (count, transfers) = state.db.list_incoming_transfers(&safe, &filter, page).await?;
    Page::new(count, transfers, page).into_response(&context)
}

/// `GET /safes/{address}/module-transactions/`
pub async fn list_module_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<QueryParams>,
    context: RequestContext,
) -> Result<Response, ApiError> {
    let safe = to_checksum(&checksum_path(&address)?, None);
    let ordering = ordering(&params, MODULE_ORDERING_FIELDS, MODULE_DEFAULT_ORDERING);
    let page = page_request(&params, &state.config.pagination);

    let (count, transactions) = state.db.list_module_transactions(&safe, &ordering, page).await?;
    Page::new(count, transactions, page).into_response(&context)
}

/// `GET /safes/{address}/creation/`
pub async fn safe_creation(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<SafeCreationInfo>, ApiError> {
    let safe = to_checksum(&checksum_path(&address)?, None);
    state
        .db
        .safe_creation(&safe)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Fails with 404 unless `address` is a known Safe contract
async fn registered_safe(state: &AppState, address: &str) -> Result<Address, ApiError> {
    let safe = checksum_path(address)?;
    if !state.db.safe_contract_exists(&to_checksum(&safe, None)).await? {
        return Err(ApiError::NotFound);
    }
    Ok(safe)
}

/// `GET /safes/{address}/balances/`
pub async fn balances(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<Balance>>, ApiError> {
    let safe = registered_safe(&state, &address).await?;
    Ok(Json(state.balances.get_balances(safe).await?))
}

/// `GET /safes/{address}/balances/usd/`
pub async fn usd_balances(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<UsdBalance>>, ApiError> {
    let safe = registered_safe(&state, &address).await?;
    Ok(Json(state.balances.get_usd_balances(safe).await?))
}

/// `GET /transactions/{safe_tx_hash}/`
///
/// Anything that is not a 32 byte hex hash cannot match and is a 404.
pub async fn multisig_transaction(
    State(state): State<AppState>,
    Path(safe_tx_hash): Path<String>,
) -> Result<Json<MultisigTransaction>, ApiError> {
    let digits = safe_tx_hash.strip_prefix("0x").unwrap_or(&safe_tx_hash);
    let bytes = hex::decode(digits).map_err(|_| ApiError::NotFound)?;
    if bytes.len() != 32 {
        return Err(ApiError::NotFound);
    }

    state
        .db
        .get_multisig_transaction(&H256::from_slice(&bytes))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// `GET /owners/{address}/`
pub async fn owner_safes(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<OwnerSafes>, ApiError> {
    let owner = to_checksum(&checksum_path(&address)?, None);
    let safes = state.db.safes_for_owner(&owner).await?;
    if safes.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(OwnerSafes { safes }))
}
