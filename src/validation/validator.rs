use super::address::parse_checksum_address;
use super::errors::FieldErrors;
use super::safe_tx::SafeTx;
use super::signatures::parse_signatures;
use crate::store::{Database, NewMultisigConfirmation, NewMultisigTransaction};
use crate::types::Operation;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use ethers::utils::{hex, to_checksum};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a submission was not accepted
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid multisig transaction: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<FieldErrors> for SubmissionError {
    fn from(errors: FieldErrors) -> Self {
        SubmissionError::Invalid(errors)
    }
}

/// Multisig transaction proposal with every field parsed
#[derive(Debug, Clone, PartialEq)]
pub struct MultisigTransactionSubmission {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Option<Vec<u8>>,
    pub operation: Operation,
    pub gas_token: Option<Address>,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub refund_receiver: Option<Address>,
    pub nonce: u64,
    pub contract_transaction_hash: H256,
    pub sender: Address,
    pub signature: Option<Vec<u8>>,
    pub origin: Option<String>,
}

impl MultisigTransactionSubmission {
    /// Parses a request body, collecting one error list per bad field
    pub fn from_json(safe: Address, body: &Value) -> Result<Self, FieldErrors> {
        let Some(object) = body.as_object() else {
            let mut errors = FieldErrors::new();
            errors.add_non_field("Invalid data. Expected a dictionary.");
            return Err(errors);
        };

        let mut fields = Fields::new(object);
        let to = fields.required("to", parse_address);
        let value = fields.required("value", parse_uint);
        let data = fields.optional("data", parse_bytes);
        let operation = fields.required("operation", parse_operation);
        let gas_token = fields.optional("gas_token", parse_address);
        let safe_tx_gas = fields.required("safe_tx_gas", parse_uint);
        let base_gas = fields.required("base_gas", parse_uint);
        let gas_price = fields.required("gas_price", parse_uint);
        let refund_receiver = fields.optional("refund_receiver", parse_address);
        let nonce = fields.required("nonce", parse_nonce);
        let contract_transaction_hash = fields.required("contract_transaction_hash", parse_hash);
        let sender = fields.required("sender", parse_address);
        let signature = fields.optional("signature", parse_signature);
        let origin = fields.optional("origin", parse_origin);

        let errors = fields.errors;
        match (
            to,
            value,
            operation,
            safe_tx_gas,
            base_gas,
            gas_price,
            nonce,
            contract_transaction_hash,
            sender,
        ) {
            (
                Some(to),
                Some(value),
                Some(operation),
                Some(safe_tx_gas),
                Some(base_gas),
                Some(gas_price),
                Some(nonce),
                Some(contract_transaction_hash),
                Some(sender),
            ) if errors.is_empty() => Ok(Self {
                safe,
                to,
                value,
                data: data.filter(|bytes| !bytes.is_empty()),
                operation,
                gas_token,
                safe_tx_gas,
                base_gas,
                gas_price,
                refund_receiver,
                nonce,
                contract_transaction_hash,
                sender,
                signature: signature.filter(|bytes| !bytes.is_empty()),
                origin,
            }),
            _ => Err(errors),
        }
    }

    pub fn safe_tx(&self) -> SafeTx {
        SafeTx {
            safe: self.safe,
            to: self.to,
            value: self.value,
            data: self.data.clone().unwrap_or_default(),
            operation: self.operation,
            safe_tx_gas: self.safe_tx_gas,
            base_gas: self.base_gas,
            gas_price: self.gas_price,
            gas_token: self.gas_token.unwrap_or_else(Address::zero),
            refund_receiver: self.refund_receiver.unwrap_or_else(Address::zero),
            nonce: U256::from(self.nonce),
        }
    }
}

/// Rows to store for an accepted submission
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub transaction: NewMultisigTransaction,
    pub confirmations: Vec<NewMultisigConfirmation>,
}

/// Checks multisig transaction proposals against the indexed Safe state
pub struct Validator {
    db: Database,
}

impl Validator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate a proposal
    ///
    /// The computed safe tx hash must match the provided one, the Safe must
    /// be indexed, the sender and every signer must be owners, the sender
    /// must have signed, and the transaction must not be executed yet.
    pub async fn validate(
        &self,
        submission: MultisigTransactionSubmission,
    ) -> Result<ValidatedSubmission, SubmissionError> {
        let safe = to_checksum(&submission.safe, None);
        let sender = to_checksum(&submission.sender, None);
        let safe_tx_hash = submission.safe_tx().safe_tx_hash();
        debug!("Validating multisig tx {:?} for safe {}", safe_tx_hash, safe);

        let mut errors = FieldErrors::new();

        if safe_tx_hash != submission.contract_transaction_hash {
            errors.add(
                "contract_transaction_hash",
                format!(
                    "Contract-transaction-hash={:?} does not match provided contract-tx-hash={:?}",
                    safe_tx_hash, submission.contract_transaction_hash
                ),
            );
            return Err(errors.into());
        }

        let Some(status) = self.db.last_safe_status(&safe).await? else {
            errors.add_non_field(format!("Safe={} does not exist or it's still not indexed", safe));
            return Err(errors.into());
        };
        let owners = status.owners;

        if !owners.contains(&sender) {
            warn!("Sender {} is not an owner of {}", sender, safe);
            errors.add(
                "sender",
                format!("Sender={} is not an owner. Current owners={:?}", sender, owners),
            );
        }

        if let Some(Some(executed_in)) = self.db.multisig_execution(&safe_tx_hash).await? {
            errors.add_non_field(format!(
                "Tx with safe-tx-hash={:?} for safe={} was already executed in tx-hash={}",
                safe_tx_hash, safe, executed_in
            ));
        }

        let now = Utc::now();
        let mut confirmations = Vec::new();

        if let Some(signature) = &submission.signature {
            match parse_signatures(signature, safe_tx_hash) {
                Ok(parsed) => {
                    let signers: Vec<String> =
                        parsed.iter().map(|s| to_checksum(&s.owner, None)).collect();

                    for signer in &signers {
                        if !owners.contains(signer) {
                            errors.add(
                                "signature",
                                format!("Signer={} is not an owner. Current owners={:?}", signer, owners),
                            );
                        }
                    }
                    if !signers.contains(&sender) {
                        errors.add(
                            "signature",
                            format!(
                                "Signature does not match sender={}. Calculated owners={:?}",
                                sender, signers
                            ),
                        );
                    }

                    confirmations = parsed
                        .into_iter()
                        .map(|s| NewMultisigConfirmation {
                            multisig_transaction_hash: safe_tx_hash,
                            owner: s.owner,
                            ethereum_tx_hash: None,
                            signature: Some(s.signature),
                            signature_type: Some(s.signature_type),
                            created: now,
                        })
                        .collect();
                }
                Err(e) => errors.add("signature", e.to_string()),
            }
        }

        if !errors.is_empty() {
            warn!("Rejected multisig tx {:?}: {}", safe_tx_hash, errors);
            return Err(errors.into());
        }

        Ok(ValidatedSubmission {
            transaction: NewMultisigTransaction {
                safe_tx_hash,
                safe: submission.safe,
                ethereum_tx_hash: None,
                to: submission.to,
                value: submission.value,
                data: submission.data,
                operation: submission.operation,
                safe_tx_gas: submission.safe_tx_gas,
                base_gas: submission.base_gas,
                gas_price: submission.gas_price,
                gas_token: submission.gas_token,
                refund_receiver: submission.refund_receiver,
                signatures: None,
                nonce: submission.nonce,
                origin: submission.origin,
                created: now,
            },
            confirmations,
        })
    }
}

/// Reads fields off a JSON object, recording errors as it goes
struct Fields<'a> {
    object: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> Fields<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            errors: FieldErrors::new(),
        }
    }

    fn value(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name).filter(|value| !value.is_null())
    }

    fn required<T>(&mut self, name: &str, parse: fn(&Value) -> Result<T, String>) -> Option<T> {
        match self.value(name) {
            Some(value) => self.parse(name, value, parse),
            None => {
                self.errors.add(name, "This field is required.");
                None
            }
        }
    }

    fn optional<T>(&mut self, name: &str, parse: fn(&Value) -> Result<T, String>) -> Option<T> {
        let value = self.value(name)?;
        self.parse(name, value, parse)
    }

    fn parse<T>(&mut self, name: &str, value: &Value, parse: fn(&Value) -> Result<T, String>) -> Option<T> {
        match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                self.errors.add(name, message);
                None
            }
        }
    }
}

fn as_str(value: &Value) -> Result<&str, String> {
    value.as_str().ok_or_else(|| "Not a valid string.".to_string())
}

fn parse_address(value: &Value) -> Result<Address, String> {
    let raw = as_str(value)?;
    parse_checksum_address(raw).ok_or_else(|| format!("Address {} is not checksumed", raw))
}

fn parse_uint(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| "A valid integer is required.".to_string()),
        Value::String(raw) => {
            U256::from_dec_str(raw.trim()).map_err(|_| "A valid integer is required.".to_string())
        }
        _ => Err("A valid integer is required.".to_string()),
    }
}

fn parse_nonce(value: &Value) -> Result<u64, String> {
    let nonce = parse_uint(value)?;
    if nonce > U256::from(i64::MAX as u64) {
        return Err("Ensure this value is less than or equal to 9223372036854775807.".to_string());
    }
    Ok(nonce.as_u64())
}

fn parse_operation(value: &Value) -> Result<Operation, String> {
    let operation = parse_uint(value)?;
    if operation > U256::from(u8::MAX) {
        return Err(format!("\"{}\" is not a valid choice.", operation));
    }
    Operation::try_from(operation.as_u64() as u8)
}

fn parse_bytes(value: &Value) -> Result<Vec<u8>, String> {
    let raw = as_str(value)?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|_| format!("{} is not a valid hexadecimal value", raw))
}

/// Concatenated 65 byte static signatures, no dynamic contract data
fn parse_signature(value: &Value) -> Result<Vec<u8>, String> {
    let bytes = parse_bytes(value)?;
    if bytes.len() % 65 != 0 {
        return Err(format!("Signature length must be a multiple of 65, got {}", bytes.len()));
    }
    Ok(bytes)
}

fn parse_hash(value: &Value) -> Result<H256, String> {
    let bytes = parse_bytes(value)?;
    if bytes.len() != 32 {
        return Err(format!("Hash must be 32 bytes, got {}", bytes.len()));
    }
    Ok(H256::from_slice(&bytes))
}

fn parse_origin(value: &Value) -> Result<String, String> {
    let origin = as_str(value)?;
    if origin.chars().count() > 100 {
        return Err("Ensure this field has no more than 100 characters.".to_string());
    }
    Ok(origin.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn safe() -> Address {
        Address::from_low_u64_be(0x5afe)
    }

    fn body() -> Value {
        json!({
            "to": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "value": "1000000000000000000000",
            "data": "0x",
            "operation": 0,
            "gas_token": null,
            "safe_tx_gas": 50000,
            "base_gas": "0",
            "gas_price": 0,
            "refund_receiver": null,
            "nonce": 3,
            "contract_transaction_hash": format!("{:?}", H256::zero()),
            "sender": "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        })
    }

    #[test]
    fn test_parses_numbers_and_decimal_strings() {
        let submission = MultisigTransactionSubmission::from_json(safe(), &body()).unwrap();

        assert_eq!(submission.value, U256::exp10(21));
        assert_eq!(submission.safe_tx_gas, U256::from(50_000u64));
        assert_eq!(submission.nonce, 3);
        assert_eq!(submission.data, None);
        assert_eq!(submission.gas_token, None);
        assert_eq!(submission.signature, None);
    }

    #[test]
    fn test_reports_errors_per_field() {
        let mut body = body();
        body["to"] = json!("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        body["operation"] = json!(7);
        body["data"] = json!("0xzz");
        body.as_object_mut().unwrap().remove("sender");

        let errors = MultisigTransactionSubmission::from_json(safe(), &body).unwrap_err();

        assert_eq!(
            errors.get("to").unwrap(),
            ["Address 0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed is not checksumed"]
        );
        assert_eq!(errors.get("operation").unwrap(), ["\"7\" is not a valid choice."]);
        assert!(errors.get("data").is_some());
        assert_eq!(errors.get("sender").unwrap(), ["This field is required."]);
        assert!(errors.get("value").is_none());
    }

    #[test]
    fn test_signature_length_must_be_multiple_of_65() {
        let mut body = body();
        body["signature"] = json!(format!("0x{}", "11".repeat(162)));

        let errors = MultisigTransactionSubmission::from_json(safe(), &body).unwrap_err();
        assert_eq!(
            errors.get("signature").unwrap(),
            ["Signature length must be a multiple of 65, got 162"]
        );

        body["signature"] = json!(format!("0x{}", "11".repeat(130)));
        let submission = MultisigTransactionSubmission::from_json(safe(), &body).unwrap();
        assert_eq!(submission.signature.map(|s| s.len()), Some(130));
    }

    #[test]
    fn test_rejects_non_object_body() {
        let errors = MultisigTransactionSubmission::from_json(safe(), &json!([1, 2])).unwrap_err();
        assert!(errors.get(crate::validation::NON_FIELD_ERRORS).is_some());
    }

    #[test]
    fn test_safe_tx_defaults_optional_addresses_to_zero() {
        let submission = MultisigTransactionSubmission::from_json(safe(), &body()).unwrap();
        let safe_tx = submission.safe_tx();

        assert_eq!(safe_tx.gas_token, Address::zero());
        assert_eq!(safe_tx.refund_receiver, Address::zero());
        assert!(safe_tx.data.is_empty());
    }
}
