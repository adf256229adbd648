//! EIP-712 hashing of Safe transactions
//!
//! Uses the Safe v1.0/v1.1 domain, which only binds the verifying contract.

use crate::types::Operation;
use ethers::abi::{Token, encode};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

const DOMAIN_SEPARATOR_TYPE: &str = "EIP712Domain(address verifyingContract)";
const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,\
uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Transaction parameters signed by Safe owners
#[derive(Debug, Clone, PartialEq)]
pub struct SafeTx {
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

impl SafeTx {
    pub fn domain_separator(&self) -> H256 {
        H256(keccak256(encode(&[
            Token::FixedBytes(keccak256(DOMAIN_SEPARATOR_TYPE).to_vec()),
            Token::Address(self.safe),
        ])))
    }

    fn struct_hash(&self) -> [u8; 32] {
        keccak256(encode(&[
            Token::FixedBytes(keccak256(SAFE_TX_TYPE).to_vec()),
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::FixedBytes(keccak256(&self.data).to_vec()),
            Token::Uint(U256::from(u8::from(self.operation))),
            Token::Uint(self.safe_tx_gas),
            Token::Uint(self.base_gas),
            Token::Uint(self.gas_price),
            Token::Address(self.gas_token),
            Token::Address(self.refund_receiver),
            Token::Uint(self.nonce),
        ]))
    }

    /// Hash the owners sign: `keccak256(0x19 0x01 domainSeparator structHash)`
    pub fn safe_tx_hash(&self) -> H256 {
        let mut message = Vec::with_capacity(66);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(self.domain_separator().as_bytes());
        message.extend_from_slice(&self.struct_hash());
        H256(keccak256(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SafeTx {
        SafeTx {
            safe: Address::from_low_u64_be(0x5afe),
            to: Address::from_low_u64_be(0xbeef),
            value: U256::from(1_000u64),
            data: vec![],
            operation: Operation::Call,
            safe_tx_gas: U256::from(50_000u64),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
            nonce: U256::zero(),
        }
    }

    #[test]
    fn test_type_hashes_match_safe_contracts() {
        assert_eq!(
            H256(keccak256(SAFE_TX_TYPE)),
            "0xbb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8"
                .parse::<H256>()
                .unwrap()
        );
        assert_eq!(
            H256(keccak256(DOMAIN_SEPARATOR_TYPE)),
            "0x035aff83d86937d35b32e04f0ddc6ff469290eef2f1b692d8a815c89404d4749"
                .parse::<H256>()
                .unwrap()
        );
    }

    #[test]
    fn test_hash_binds_every_parameter() {
        let base = sample().safe_tx_hash();

        let mut other_safe = sample();
        other_safe.safe = Address::from_low_u64_be(0x5aff);
        assert_ne!(other_safe.safe_tx_hash(), base);

        let mut other_nonce = sample();
        other_nonce.nonce = U256::one();
        assert_ne!(other_nonce.safe_tx_hash(), base);

        let mut other_operation = sample();
        other_operation.operation = Operation::DelegateCall;
        assert_ne!(other_operation.safe_tx_hash(), base);

        assert_eq!(sample().safe_tx_hash(), base);
    }
}
