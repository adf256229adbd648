//! Multisig Transaction Validation Module
//!
//! Parses multisig transaction proposals and checks them before they are
//! stored: EIP-712 hash, Safe ownership and owner signatures.

mod address;
mod errors;
mod safe_tx;
mod signatures;
mod validator;

pub use address::parse_checksum_address;
pub use errors::{FieldErrors, NON_FIELD_ERRORS};
pub use safe_tx::SafeTx;
pub use signatures::{SafeSignature, SignatureError, parse_signatures};
pub use validator::{MultisigTransactionSubmission, SubmissionError, ValidatedSubmission, Validator};
