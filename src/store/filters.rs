//! Query shaping: filters, ordering and pagination windows
//!
//! Filters are parsed from raw query parameters. Empty parameters are
//! ignored, malformed ones are reported per field.

use super::database::encode_timestamp;
use crate::validation::{FieldErrors, parse_checksum_address};
use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

pub type QueryParams = HashMap<String, String>;

/// Window of rows to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderTerm {
    column: &'static str,
    descending: bool,
}

/// `ORDER BY` terms built from an `ordering` parameter
///
/// Only fields present in the allow list are accepted, mapped to their SQL
/// column. Unknown fields are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    terms: Vec<OrderTerm>,
}

impl Ordering {
    /// Parses `param`, falling back to `default` when it yields no usable term
    pub fn parse(param: Option<&str>, allowed: &[(&str, &'static str)], default: &str) -> Self {
        let terms = param.map(|p| Self::terms(p, allowed)).unwrap_or_default();
        if terms.is_empty() {
            Self {
                terms: Self::terms(default, allowed),
            }
        } else {
            Self { terms }
        }
    }

    fn terms(param: &str, allowed: &[(&str, &'static str)]) -> Vec<OrderTerm> {
        param
            .split(',')
            .map(str::trim)
            .filter_map(|field| {
                let (name, descending) = match field.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (field, false),
                };
                allowed
                    .iter()
                    .find(|(allowed_name, _)| *allowed_name == name)
                    .map(|(_, column)| OrderTerm { column: *column, descending })
            })
            .collect()
    }

    /// Appends ` ORDER BY ...`, ending with `tiebreaker` so pages are stable
    pub(crate) fn push_order_by(&self, builder: &mut QueryBuilder<'_, Sqlite>, tiebreaker: &str) {
        builder.push(" ORDER BY ");
        for term in &self.terms {
            builder.push(term.column);
            builder.push(if term.descending { " DESC, " } else { " ASC, " });
        }
        builder.push(tiebreaker);
    }
}

/// Filters accepted by the multisig transaction list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultisigTransactionFilter {
    pub nonce: Option<u64>,
    pub nonce_gte: Option<u64>,
    pub nonce_lt: Option<u64>,
    pub to: Option<String>,
    pub value: Option<U256>,
    pub executed: Option<bool>,
    pub submission_date_gte: Option<DateTime<Utc>>,
    pub submission_date_lte: Option<DateTime<Utc>>,
    pub safe_tx_hash: Option<H256>,
}

impl MultisigTransactionFilter {
    pub fn from_query(params: &QueryParams) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let filter = Self {
            nonce: param(params, "nonce", parse_u64, &mut errors),
            nonce_gte: param(params, "nonce__gte", parse_u64, &mut errors),
            nonce_lt: param(params, "nonce__lt", parse_u64, &mut errors),
            to: param(params, "to", parse_address, &mut errors),
            value: param(params, "value", parse_uint, &mut errors),
            executed: param(params, "executed", parse_bool, &mut errors),
            submission_date_gte: param(params, "submission_date__gte", parse_datetime, &mut errors),
            submission_date_lte: param(params, "submission_date__lte", parse_datetime, &mut errors),
            safe_tx_hash: param(params, "safe_tx_hash", parse_hash, &mut errors),
        };
        errors.into_result(filter)
    }

    /// Appends ` AND ...` conditions over the `m` (multisig_transaction) alias
    pub(crate) fn push_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(nonce) = self.nonce {
            builder.push(" AND m.nonce = ").push_bind(nonce as i64);
        }
        if let Some(nonce) = self.nonce_gte {
            builder.push(" AND m.nonce >= ").push_bind(nonce as i64);
        }
        if let Some(nonce) = self.nonce_lt {
            builder.push(" AND m.nonce < ").push_bind(nonce as i64);
        }
        if let Some(to) = &self.to {
            builder.push(" AND m.to_address = ").push_bind(to.clone());
        }
        if let Some(value) = self.value {
            builder.push(" AND m.value = ").push_bind(value.to_string());
        }
        match self.executed {
            Some(true) => {
                builder.push(" AND m.ethereum_tx_hash IS NOT NULL");
            }
            Some(false) => {
                builder.push(" AND m.ethereum_tx_hash IS NULL");
            }
            None => {}
        }
        if let Some(date) = &self.submission_date_gte {
            builder.push(" AND m.created >= ").push_bind(encode_timestamp(date));
        }
        if let Some(date) = &self.submission_date_lte {
            builder.push(" AND m.created <= ").push_bind(encode_timestamp(date));
        }
        if let Some(hash) = &self.safe_tx_hash {
            builder.push(" AND m.safe_tx_hash = ").push_bind(format!("{:?}", hash));
        }
    }
}

/// Filters accepted by the incoming transfers list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingTransferFilter {
    pub value: Option<U256>,
    pub block_number_gt: Option<u64>,
    pub block_number_lt: Option<u64>,
    pub execution_date_gte: Option<DateTime<Utc>>,
    pub execution_date_lte: Option<DateTime<Utc>>,
    pub token_address: Option<String>,
}

impl IncomingTransferFilter {
    pub fn from_query(params: &QueryParams) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let filter = Self {
            value: param(params, "value", parse_uint, &mut errors),
            block_number_gt: param(params, "block_number__gt", parse_u64, &mut errors),
            block_number_lt: param(params, "block_number__lt", parse_u64, &mut errors),
            execution_date_gte: param(params, "execution_date__gte", parse_datetime, &mut errors),
            execution_date_lte: param(params, "execution_date__lte", parse_datetime, &mut errors),
            token_address: param(params, "token_address", parse_address, &mut errors),
        };
        errors.into_result(filter)
    }

    /// Appends ` AND ...` conditions over the columns of the incoming union
    pub(crate) fn push_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(value) = self.value {
            builder.push(" AND value = ").push_bind(value.to_string());
        }
        if let Some(block) = self.block_number_gt {
            builder.push(" AND block_number > ").push_bind(block as i64);
        }
        if let Some(block) = self.block_number_lt {
            builder.push(" AND block_number < ").push_bind(block as i64);
        }
        if let Some(date) = &self.execution_date_gte {
            builder.push(" AND execution_date >= ").push_bind(encode_timestamp(date));
        }
        if let Some(date) = &self.execution_date_lte {
            builder.push(" AND execution_date <= ").push_bind(encode_timestamp(date));
        }
        if let Some(token) = &self.token_address {
            builder.push(" AND token_address = ").push_bind(token.clone());
        }
    }
}

fn param<T>(
    params: &QueryParams,
    name: &str,
    parse: fn(&str) -> Result<T, &'static str>,
    errors: &mut FieldErrors,
) -> Option<T> {
    let raw = params.get(name).map(|value| value.trim())?;
    if raw.is_empty() {
        return None;
    }
    match parse(raw) {
        Ok(value) => Some(value),
        Err(message) => {
            errors.add(name, message);
            None
        }
    }
}

/// Whole number that fits the store's signed integer columns
fn parse_u64(raw: &str) -> Result<u64, &'static str> {
    let value: u64 = raw.parse().map_err(|_| "Enter a whole number.")?;
    if value > i64::MAX as u64 {
        return Err("Ensure this value is less than or equal to 9223372036854775807.");
    }
    Ok(value)
}

fn parse_uint(raw: &str) -> Result<U256, &'static str> {
    U256::from_dec_str(raw).map_err(|_| "Enter a number.")
}

fn parse_bool(raw: &str) -> Result<bool, &'static str> {
    match raw {
        "true" | "True" | "1" => Ok(true),
        "false" | "False" | "0" => Ok(false),
        _ => Err("Select a valid choice."),
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, &'static str> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| "Enter a valid date/time.")
}

fn parse_address(raw: &str) -> Result<String, &'static str> {
    parse_checksum_address(raw)
        .map(|_| raw.to_string())
        .ok_or("Enter a valid checksummed address.")
}

fn parse_hash(raw: &str) -> Result<H256, &'static str> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.len() != 64 {
        return Err("Enter a valid 32 byte hash.");
    }
    digits.parse().map_err(|_| "Enter a valid 32 byte hash.")
}
