//! The data model at the heart of the fuzzer: an EVM message, one executed
//! element of a sequence, and the ordered sequence itself (§3).
use crate::abi::AbiMethod;
use crate::chain::{ExecutionError, MessageResults};
use crate::types::{u256_saturating_u128, Address, EvmU256};
use ethers::abi::Token;
use sha3::{Digest, Sha3_256};

/// A decoded ABI call: the method being invoked plus the argument values.
/// Invariant (carried from §3): if `data_abi` is set on the owning
/// [`CallMessage`], `data` must be the canonical encoding of these values;
/// callers that mutate `input_values` must call
/// [`CallMessage::re_encode_data`] before the message is used.
#[derive(Debug, Clone)]
pub struct AbiCall {
    pub method: AbiMethod,
    pub input_values: Vec<Token>,
}

impl AbiCall {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.method.selector.to_vec();
        out.extend(ethers::abi::encode(&self.input_values));
        out
    }

    fn argument_byte_len(&self) -> usize {
        self.input_values.iter().map(token_byte_len).sum()
    }
}

/// Rough byte-cost of a decoded ABI value, used only by the shrinker's
/// complexity measure (§4.4) — not a real ABI-encoded size.
fn token_byte_len(t: &Token) -> usize {
    match t {
        Token::Address(_) => 20,
        Token::FixedBytes(b) | Token::Bytes(b) => b.len(),
        Token::Int(v) | Token::Uint(v) => {
            // number of non-zero bytes, so smaller magnitudes cost less
            let bytes = v.0;
            let mut n = 32usize;
            'outer: for limb in bytes.iter().rev() {
                for shift in (0..64).step_by(8).rev() {
                    if (limb >> shift) & 0xff != 0 {
                        break 'outer;
                    }
                    n -= 1;
                }
            }
            n
        }
        Token::Bool(_) => 1,
        Token::String(s) => s.len(),
        Token::FixedArray(items) | Token::Array(items) | Token::Tuple(items) => {
            items.iter().map(token_byte_len).sum()
        }
    }
}

/// An EVM message: sender, optional recipient, nonce, value, gas parameters,
/// and either raw `data` bytes or a decoded ABI call.
#[derive(Debug, Clone)]
pub struct CallMessage {
    pub sender: Address,
    pub recipient: Option<Address>,
    pub nonce: u64,
    pub value: EvmU256,
    pub gas_limit: u64,
    pub gas_price: EvmU256,
    pub max_fee_per_gas: Option<EvmU256>,
    pub max_priority_fee_per_gas: Option<EvmU256>,
    pub data: Vec<u8>,
    pub data_abi: Option<AbiCall>,
}

impl CallMessage {
    /// Re-encodes `data` from `data_abi`. Must be called after mutating
    /// `data_abi.input_values` directly.
    pub fn re_encode_data(&mut self) {
        if let Some(abi) = &self.data_abi {
            self.data = abi.encode();
        }
    }
}

/// One element of a [`CallSequence`]: a message plus the delays applied
/// before executing it, and — once executed — the chain's results.
///
/// Invariant (§3): `block_number_delay <= block_timestamp_delay` whenever
/// both are nonzero; if `block_timestamp_delay == 0` then
/// `block_number_delay == 0` (a new block needs a distinct timestamp, so you
/// cannot advance the block number without advancing time).
#[derive(Debug, Clone)]
pub struct CallSequenceElement {
    pub call: CallMessage,
    pub block_number_delay: u64,
    pub block_timestamp_delay: u64,
    pub contract: Option<Address>,
    pub results: Option<MessageResults>,
}

impl CallSequenceElement {
    pub fn new(call: CallMessage, block_number_delay: u64, block_timestamp_delay: u64, contract: Option<Address>) -> Self {
        let element = Self {
            call,
            block_number_delay,
            block_timestamp_delay,
            contract,
            results: None,
        };
        debug_assert!(element.delay_invariant_holds());
        element
    }

    pub fn delay_invariant_holds(&self) -> bool {
        if self.block_timestamp_delay == 0 {
            self.block_number_delay == 0
        } else {
            self.block_number_delay <= self.block_timestamp_delay
        }
    }

    /// True once `results` shows the EVM reverted (as opposed to succeeding
    /// or failing some other way, e.g. out-of-gas).
    pub fn reverted(&self) -> bool {
        matches!(
            self.results.as_ref().map(|r| &r.execution_result.err),
            Some(Some(ExecutionError::Revert))
        )
    }

    /// `|value| + |gas_price| + block_number_delay + block_timestamp_delay +
    /// sum(|arg_bytes|)` from §4.4, used by the shrinker's acceptance
    /// measure. Saturating: precision loss above `u128` never flips an
    /// ordering between two sequences that differ in any smaller term.
    pub fn complexity(&self) -> u128 {
        let value = u256_saturating_u128(self.call.value);
        let gas_price = u256_saturating_u128(self.call.gas_price);
        let args = self.call.data_abi.as_ref().map(|a| a.argument_byte_len() as u128).unwrap_or(0);
        value
            .saturating_add(gas_price)
            .saturating_add(self.block_number_delay as u128)
            .saturating_add(self.block_timestamp_delay as u128)
            .saturating_add(args)
    }
}

/// An ordered sequence of [`CallSequenceElement`]s. Execution order is
/// sequence order.
#[derive(Debug, Clone, Default)]
pub struct CallSequence {
    pub elements: Vec<CallSequenceElement>,
}

impl CallSequence {
    pub fn new(elements: Vec<CallSequenceElement>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// `(len, total complexity)`, compared lexicographically by the
    /// shrinker (§4.4): a proposal is only accepted if it strictly
    /// decreases this tuple.
    pub fn measure(&self) -> (usize, u128) {
        let total = self.elements.iter().fold(0u128, |acc, e| acc.saturating_add(e.complexity()));
        (self.len(), total)
    }

    /// Content-addressed fingerprint used for corpus dedup (§4.1): SHA3-256
    /// over the concatenation, per element, of
    /// `(method_selector, abi-encoded args, value, sender, block_delay,
    /// timestamp_delay)`.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        for element in &self.elements {
            let selector = element
                .call
                .data_abi
                .as_ref()
                .map(|a| a.method.selector)
                .unwrap_or([0u8; 4]);
            hasher.update(selector);
            if let Some(abi) = &element.call.data_abi {
                hasher.update(ethers::abi::encode(&abi.input_values));
            }
            let mut value_bytes = [0u8; 32];
            element.call.value.to_big_endian(&mut value_bytes);
            hasher.update(value_bytes);
            hasher.update(element.call.sender.as_bytes());
            hasher.update(element.block_number_delay.to_be_bytes());
            hasher.update(element.block_timestamp_delay.to_be_bytes());
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H160;

    fn dummy_message(sender: u8, value: u64) -> CallMessage {
        CallMessage {
            sender: H160::from_low_u64_be(sender as u64),
            recipient: Some(H160::from_low_u64_be(0xaa)),
            nonce: 0,
            value: EvmU256::from(value),
            gas_limit: 1_000_000,
            gas_price: EvmU256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data: vec![],
            data_abi: None,
        }
    }

    #[test]
    fn delay_invariant_flags_bad_elements() {
        let e = CallSequenceElement {
            call: dummy_message(1, 0),
            block_number_delay: 5,
            block_timestamp_delay: 0,
            contract: None,
            results: None,
        };
        assert!(!e.delay_invariant_holds());
    }

    #[test]
    fn identical_sequences_fingerprint_equal() {
        let a = CallSequence::new(vec![CallSequenceElement::new(dummy_message(1, 7), 0, 0, None)]);
        let b = CallSequence::new(vec![CallSequenceElement::new(dummy_message(1, 7), 0, 0, None)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn different_sender_changes_fingerprint() {
        let a = CallSequence::new(vec![CallSequenceElement::new(dummy_message(1, 7), 0, 0, None)]);
        let b = CallSequence::new(vec![CallSequenceElement::new(dummy_message(2, 7), 0, 0, None)]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn complexity_grows_with_value_and_delays() {
        let small = CallSequenceElement::new(dummy_message(1, 0), 0, 0, None);
        let large = CallSequenceElement::new(dummy_message(1, 100), 2, 4, None);
        assert!(large.complexity() > small.complexity());
    }
}
