//! Common type aliases shared across the core. Kept tiny on purpose: the
//! core only needs to agree with the `Chain` implementation on address and
//! selector representation, nothing more.
use ethers::types::{H160, U256};

/// EVM account address.
pub type Address = H160;

/// A 256-bit EVM integer. Used for `value`, `gas_price`, and fee caps.
pub type EvmU256 = U256;

/// First four bytes of a function or error ABI signature hash.
pub type Selector = [u8; 4];

/// The distinguished "call succeeded" error selector (§3: all-zero).
pub const SUCCESS_SELECTOR: Selector = [0x00, 0x00, 0x00, 0x00];

/// The Solidity compiler panic selector `Panic(uint256)`.
pub const PANIC_SELECTOR: Selector = [0x4e, 0x48, 0x7b, 0x71];

/// Computes the 4-byte selector of a Solidity function/error signature, e.g.
/// `"transfer(address,uint256)"`.
pub fn selector_of(signature: &str) -> Selector {
    let hash = ethers::utils::keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Saturating narrowing of a 256-bit value into a `u128`, used only for the
/// shrinker's complexity measure (§4.4), where exact magnitude doesn't
/// matter past the point two sequences are distinguishable.
pub fn u256_saturating_u128(v: EvmU256) -> u128 {
    if v > EvmU256::from(u128::MAX) {
        u128::MAX
    } else {
        v.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_signature() {
        // transfer(address,uint256) selector is well known: 0xa9059cbb
        assert_eq!(selector_of("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn saturating_narrow_caps_at_u128_max() {
        let huge = EvmU256::MAX;
        assert_eq!(u256_saturating_u128(huge), u128::MAX);
        assert_eq!(u256_saturating_u128(EvmU256::from(42u64)), 42u128);
    }
}
