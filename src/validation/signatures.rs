//! Safe signature parsing
//!
//! Safe signatures are a concatenation of 65 byte `{r}{s}{v}` static parts,
//! optionally followed by dynamic data referenced by contract signatures.
//! The `v` byte selects how the owner is derived:
//! - `0`: contract signature (EIP-1271), owner is `r`
//! - `1`: pre-approved hash, owner is `r`
//! - `27`/`28`: ECDSA signature over the safe tx hash
//! - `> 30`: `eth_sign` signature over the safe tx hash, `v - 4` recovers

use crate::types::SignatureType;
use ethers::types::{Address, H256, RecoveryMessage, Signature, U256};
use thiserror::Error;

const STATIC_PART_LENGTH: usize = 65;

/// Errors raised while parsing a signature blob
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Signature must contain at least 65 bytes, got {0}")]
    TooShort(usize),
    #[error("Signature {0} is truncated")]
    Truncated(usize),
    #[error("Signature {0} has an unsupported v={1}")]
    UnsupportedV(usize, u8),
    #[error("Signature {0} cannot be recovered")]
    Unrecoverable(usize),
}

/// One owner approval extracted from a signature blob
#[derive(Debug, Clone, PartialEq)]
pub struct SafeSignature {
    pub owner: Address,
    pub signature_type: SignatureType,
    /// The 65 byte static part
    pub signature: Vec<u8>,
}

/// Parses every signature in `signatures` and derives its owner for
/// `safe_tx_hash`
pub fn parse_signatures(signatures: &[u8], safe_tx_hash: H256) -> Result<Vec<SafeSignature>, SignatureError> {
    if signatures.len() < STATIC_PART_LENGTH {
        return Err(SignatureError::TooShort(signatures.len()));
    }

    let mut parsed = Vec::new();
    // Dynamic data of contract signatures starts after the last static part
    let mut data_position = signatures.len();
    let mut offset = 0;
    let mut index = 0;

    while offset < data_position {
        let Some(part) = signatures.get(offset..offset + STATIC_PART_LENGTH) else {
            return Err(SignatureError::Truncated(index));
        };

        let r = &part[0..32];
        let s = &part[32..64];
        let v = part[64];

        let (owner, signature_type) = match v {
            0 => {
                let dynamic_offset = U256::from_big_endian(s);
                if dynamic_offset < U256::from(offset + STATIC_PART_LENGTH)
                    || dynamic_offset > U256::from(signatures.len())
                {
                    return Err(SignatureError::Truncated(index));
                }
                data_position = data_position.min(dynamic_offset.as_usize());
                (Address::from_slice(&r[12..]), SignatureType::ContractSignature)
            }
            1 => (Address::from_slice(&r[12..]), SignatureType::ApprovedHash),
            27 | 28 => (
                recover(r, s, v, RecoveryMessage::Hash(safe_tx_hash), index)?,
                SignatureType::Eoa,
            ),
            31..=34 => (
                recover(
                    r,
                    s,
                    v - 4,
                    RecoveryMessage::Data(safe_tx_hash.as_bytes().to_vec()),
                    index,
                )?,
                SignatureType::EthSign,
            ),
            other => return Err(SignatureError::UnsupportedV(index, other)),
        };

        parsed.push(SafeSignature {
            owner,
            signature_type,
            signature: part.to_vec(),
        });
        offset += STATIC_PART_LENGTH;
        index += 1;
    }

    Ok(parsed)
}

fn recover(r: &[u8], s: &[u8], v: u8, message: RecoveryMessage, index: usize) -> Result<Address, SignatureError> {
    let signature = Signature {
        r: U256::from_big_endian(r),
        s: U256::from_big_endian(s),
        v: v as u64,
    };
    signature
        .recover(message)
        .map_err(|_| SignatureError::Unrecoverable(index))
}
