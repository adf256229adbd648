//! EIP-55 checksum address validation

use ethers::types::Address;
use ethers::utils::to_checksum;

/// Parses `value` only if it is a `0x` prefixed, 20 byte address written in
/// its exact EIP-55 mixed-case form
pub fn parse_checksum_address(value: &str) -> Option<Address> {
    let digits = value.strip_prefix("0x")?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let address: Address = digits.parse().ok()?;
    (to_checksum(&address, None) == value).then_some(address)
}
