//! Reduces a failing [`CallSequence`] to a smaller one that still reproduces
//! the same failure (§4.4), re-executing every candidate from a fresh chain
//! snapshot rather than trying to patch up intermediate state (grounded in
//! the teacher's `evm/minimizer.rs` skip-and-reexecute idiom).
use crate::activity::WorkerActivity;
use crate::chain::{Chain, ChainFatalError, ExecutionError};
use crate::reversion::decode_revert_reason;
use crate::sequence::{CallSequence, CallSequenceElement};
use crate::value::ValueMutator;
use ethers::abi::ParamType;
use rand::Rng;

/// Identifies which observed failure a shrink candidate must still
/// reproduce (§4.4: "oracle-ID matching for soundness"). A candidate that
/// fails for a *different* reason, or at a different call, is rejected even
/// if it is smaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignature {
    /// The call at `element_index` must still revert with the same reason.
    RevertAt { element_index: usize, reason: String },
    /// A named property/assertion test case must still return `false`
    /// (or revert) by the end of the sequence.
    PropertyFalsified { test_case: String },
}

/// Re-executes `seq` against a fresh snapshot and reports whether the
/// target failure still reproduces, along with the sequence carrying
/// results (so the caller can inspect what actually happened).
fn reproduces<C: Chain>(
    chain: &mut C,
    base_snapshot: &C::Snapshot,
    seq: &CallSequence,
    target: &FailureSignature,
    property_check: Option<&dyn Fn(&C) -> bool>,
) -> Result<(bool, CallSequence), ChainFatalError> {
    chain.revert_to(base_snapshot);
    let mut executed = Vec::with_capacity(seq.len());
    let mut matched = false;
    for (index, element) in seq.elements.iter().enumerate() {
        let results = chain.execute(&element.call, element.block_number_delay, element.block_timestamp_delay)?;
        let reverted = matches!(results.execution_result.err, Some(ExecutionError::Revert));
        if reverted {
            if let FailureSignature::RevertAt { element_index, reason } = target {
                if *element_index == index && &decode_revert_reason(&results.execution_result.return_data) == reason {
                    matched = true;
                }
            }
        }
        let mut e = element.clone();
        e.results = Some(results);
        executed.push(e);
    }
    if let FailureSignature::PropertyFalsified { .. } = target {
        if let Some(check) = property_check {
            matched = !check(chain);
        }
    }
    Ok((matched, CallSequence::new(executed)))
}

/// Drives the shrink loop for one failing sequence (§4.4).
pub struct Shrinker<'a> {
    pub shrink_limit: u32,
    pub activity: &'a WorkerActivity,
}

impl<'a> Shrinker<'a> {
    pub fn new(shrink_limit: u32, activity: &'a WorkerActivity) -> Self {
        Self { shrink_limit, activity }
    }

    /// Main entry point: repeatedly proposes a smaller candidate, accepts it
    /// only if it still reproduces `target` and its `measure()` strictly
    /// decreases (length first, then total complexity), and stops once
    /// `shrink_limit` iterations pass with no further acceptance or no
    /// candidate can be proposed at all.
    pub fn shrink<C: Chain, R: Rng, V: ValueMutator>(
        &self,
        chain: &mut C,
        base_snapshot: &C::Snapshot,
        initial: CallSequence,
        target: &FailureSignature,
        property_check: Option<&dyn Fn(&C) -> bool>,
        rng: &mut R,
        mutator: &mut V,
    ) -> Result<CallSequence, ChainFatalError> {
        let mut best = initial;
        let mut best_measure = best.measure();
        let mut iteration = 0u32;

        loop {
            if iteration >= self.shrink_limit {
                break;
            }
            self.activity.set_shrinking(iteration as i32, self.shrink_limit as i32);

            let candidate = match self.propose_candidate(&best, rng, mutator) {
                Some(candidate) => candidate,
                None => break,
            };
            iteration += 1;

            let (matched, executed) = reproduces(chain, base_snapshot, &candidate, target, property_check)?;
            if !matched {
                continue;
            }
            let candidate_measure = executed.measure();
            if candidate_measure < best_measure {
                best = executed;
                best_measure = candidate_measure;
            }
        }

        self.activity.set_idle();
        Ok(best)
    }

    /// Proposes the next candidate by trying, in order: dropping a reverted
    /// call that isn't the target failure, shortening the sequence,
    /// shrinking a delay, or shrinking an argument/value/gas-price — the
    /// first kind that `can_shrink_further` allows.
    fn propose_candidate<R: Rng, V: ValueMutator>(&self, seq: &CallSequence, rng: &mut R, mutator: &mut V) -> Option<CallSequence> {
        if !can_shrink_further(seq) {
            return None;
        }
        let choices: [fn(&CallSequence, &mut R, &mut V) -> Option<CallSequence>; 4] =
            [remove_reverts, shorten_sequence, shrink_delay, shrink_all_transactions];
        let start = rng.gen_range(0..choices.len());
        for offset in 0..choices.len() {
            let choice = choices[(start + offset) % choices.len()];
            if let Some(candidate) = choice(seq, rng, mutator) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Any sequence with more than one element, or at least one element that
/// still carries a nonzero value, gas price, delay, or a non-default
/// argument, can in principle shrink further (§4.4: a one-tx sequence whose
/// sole element has zero value, zero gas price, zero delays, and no ABI
/// args cannot).
pub fn can_shrink_further(seq: &CallSequence) -> bool {
    if seq.len() > 1 {
        return true;
    }
    seq.elements.iter().any(|e| {
        !e.call.value.is_zero()
            || !e.call.gas_price.is_zero()
            || e.block_number_delay > 0
            || e.block_timestamp_delay > 0
            || e.call.data_abi.as_ref().map(|a| !a.input_values.is_empty()).unwrap_or(false)
    })
}

/// Removes every element except the last whose execution reverted (§4.4):
/// the last element is never a removal candidate, so it is always kept
/// regardless of whether it reverted.
fn remove_reverts<R: Rng, V: ValueMutator>(seq: &CallSequence, rng: &mut R, _mutator: &mut V) -> Option<CallSequence> {
    if seq.len() <= 1 {
        return None;
    }
    let last = seq.len() - 1;
    let reverted_indices: Vec<usize> = seq
        .elements
        .iter()
        .enumerate()
        .take(last)
        .filter(|(_, e)| e.reverted())
        .map(|(i, _)| i)
        .collect();
    if reverted_indices.is_empty() {
        return None;
    }
    let drop = reverted_indices[rng.gen_range(0..reverted_indices.len())];
    Some(CallSequence::new(without_index(seq, drop)))
}

/// Removes a single element at index `i` (per §4.4: the delay budget of the
/// removed element is transferred onto the *preceding* element, at `i-1`,
/// when `i > 0`, so overall elapsed time is preserved even though the
/// removed call no longer executes).
fn shorten_sequence<R: Rng, V: ValueMutator>(seq: &CallSequence, rng: &mut R, _mutator: &mut V) -> Option<CallSequence> {
    if seq.len() <= 1 {
        return None;
    }
    let drop = rng.gen_range(0..seq.len());
    let mut elements = without_index(seq, drop);
    if drop > 0 {
        let removed = &seq.elements[drop];
        elements[drop - 1].block_number_delay += removed.block_number_delay;
        elements[drop - 1].block_timestamp_delay += removed.block_timestamp_delay;
    }
    Some(CallSequence::new(elements))
}

fn without_index(seq: &CallSequence, drop: usize) -> Vec<CallSequenceElement> {
    seq.elements
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != drop)
        .map(|(_, e)| e.clone())
        .collect()
}

/// Picks one element and halves (via `lower`) one of its two delays,
/// leveling delays downward across the sequence the way the teacher's
/// timestamp-jump minimization does.
fn shrink_delay<R: Rng, V: ValueMutator>(seq: &CallSequence, rng: &mut R, _mutator: &mut V) -> Option<CallSequence> {
    let candidates: Vec<usize> = seq
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| e.block_number_delay > 0 || e.block_timestamp_delay > 0)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let idx = candidates[rng.gen_range(0..candidates.len())];
    let mut elements = seq.elements.clone();
    let element = &mut elements[idx];
    if element.block_timestamp_delay > 0 {
        element.block_timestamp_delay = crate::value::lower(rng, element.block_timestamp_delay);
        element.block_number_delay = element.block_number_delay.min(element.block_timestamp_delay);
        if element.block_timestamp_delay == 0 {
            element.block_number_delay = 0;
        }
    } else if element.block_number_delay > 0 {
        element.block_number_delay = crate::value::lower(rng, element.block_number_delay);
    }
    Some(CallSequence::new(elements))
}

/// Shrinks one aspect of one call's transaction body: its value, its gas
/// price, or one of its decoded ABI arguments (§4.4's four sub-aspects,
/// minus delay which `shrink_delay` owns separately).
fn shrink_all_transactions<R: Rng, V: ValueMutator>(seq: &CallSequence, rng: &mut R, mutator: &mut V) -> Option<CallSequence> {
    #[derive(Clone, Copy)]
    enum Aspect {
        Value,
        GasPrice,
        Argument,
    }
    let candidates: Vec<(usize, Aspect)> = seq
        .elements
        .iter()
        .enumerate()
        .flat_map(|(i, e)| {
            let mut aspects = Vec::new();
            if !e.call.value.is_zero() {
                aspects.push((i, Aspect::Value));
            }
            if !e.call.gas_price.is_zero() {
                aspects.push((i, Aspect::GasPrice));
            }
            if e.call.data_abi.as_ref().map(|a| !a.input_values.is_empty()).unwrap_or(false) {
                aspects.push((i, Aspect::Argument));
            }
            aspects
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let (idx, aspect) = candidates[rng.gen_range(0..candidates.len())];
    let mut elements = seq.elements.clone();
    match aspect {
        Aspect::Value => {
            elements[idx].call.value = crate::value::lower_u256(rng, elements[idx].call.value);
        }
        Aspect::GasPrice => {
            elements[idx].call.gas_price = crate::value::lower_u256(rng, elements[idx].call.gas_price);
        }
        Aspect::Argument => {
            let abi = elements[idx].call.data_abi.as_mut()?;
            let arg_idx = rng.gen_range(0..abi.input_values.len());
            let ty: ParamType = abi.method.inputs[arg_idx].clone();
            if let Ok(shrunk) = mutator.shrink_abi_value(&ty, &abi.input_values[arg_idx]) {
                abi.input_values[arg_idx] = shrunk;
                elements[idx].call.re_encode_data();
            } else {
                return None;
            }
        }
    }
    Some(CallSequence::new(elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::{CoverageDelta, ExecutionResult, MessageResults};
    use crate::sequence::CallMessage;
    use crate::types::PANIC_SELECTOR;
    use crate::value::RandomValues;
    use ethers::types::{H160, U256};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn message(value: u64) -> CallMessage {
        CallMessage {
            sender: H160::zero(),
            recipient: None,
            nonce: 0,
            value: U256::from(value),
            gas_limit: 1,
            gas_price: U256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data: vec![],
            data_abi: None,
        }
    }

    fn panic_data(code: u8) -> Vec<u8> {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend([0u8; 31]);
        data.push(code);
        data
    }

    #[test]
    fn shrinks_toward_zero_value_while_preserving_the_failure() {
        // Oracle: the call at index 1 reverts iff its value is nonzero.
        let oracle = Box::new(|msg: &CallMessage, _bn: u64, _ts: u64| {
            if !msg.value.is_zero() {
                MessageResults {
                    execution_result: ExecutionResult::reverted(panic_data(0x11), 21_000),
                    coverage_delta: CoverageDelta::default(),
                }
            } else {
                MessageResults {
                    execution_result: ExecutionResult::success(vec![], 21_000),
                    coverage_delta: CoverageDelta::default(),
                }
            }
        });
        let mut chain = MockChain::new(oracle);
        let base_snapshot = chain.snapshot();

        let seq = CallSequence::new(vec![
            CallSequenceElement::new(message(0), 0, 0, None),
            CallSequenceElement::new(message(999_999), 0, 0, None),
        ]);
        let target = FailureSignature::RevertAt { element_index: 1, reason: "arithmetic overflow or underflow".to_string() };

        let activity = WorkerActivity::new();
        let shrinker = Shrinker::new(200, &activity);
        let mut rng = StdRng::seed_from_u64(0);
        let mut mutator = RandomValues::new(StdRng::seed_from_u64(1));

        let shrunk = shrinker.shrink(&mut chain, &base_snapshot, seq.clone(), &target, None, &mut rng, &mut mutator).unwrap();
        assert!(shrunk.measure() <= seq.measure());

        let (matched, _) = reproduces(&mut chain, &base_snapshot, &shrunk, &target, None).unwrap();
        assert!(matched);
    }

    #[test]
    fn can_shrink_further_is_false_for_minimal_sequence() {
        let seq = CallSequence::new(vec![CallSequenceElement::new(message(0), 0, 0, None)]);
        assert!(!can_shrink_further(&seq));
    }

    #[test]
    fn can_shrink_further_is_true_for_nonzero_value_or_gas_price_even_with_no_delays() {
        let mut value_only = CallSequenceElement::new(message(5), 0, 0, None);
        value_only.call.gas_price = U256::zero();
        assert!(can_shrink_further(&CallSequence::new(vec![value_only])));

        let mut gas_price_only = CallSequenceElement::new(message(0), 0, 0, None);
        gas_price_only.call.gas_price = U256::from(7u64);
        assert!(can_shrink_further(&CallSequence::new(vec![gas_price_only])));
    }

    /// spec.md's worked example: three elements with delays
    /// `(b=5,t=10),(b=2,t=3),(b=4,t=8)`; shortening index 1 must yield
    /// `[(b=7,t=13),(b=4,t=8)]` — the removed element's delay is transferred
    /// onto the *preceding* element, not the following one.
    #[test]
    fn shorten_sequence_transfers_delay_to_preceding_element() {
        let seq = CallSequence::new(vec![
            CallSequenceElement::new(message(0), 5, 10, None),
            CallSequenceElement::new(message(0), 2, 3, None),
            CallSequenceElement::new(message(0), 4, 8, None),
        ]);
        let mut elements = without_index(&seq, 1);
        elements[0].block_number_delay += seq.elements[1].block_number_delay;
        elements[0].block_timestamp_delay += seq.elements[1].block_timestamp_delay;
        let result = CallSequence::new(elements);

        assert_eq!(result.len(), 2);
        assert_eq!(result.elements[0].block_number_delay, 7);
        assert_eq!(result.elements[0].block_timestamp_delay, 13);
        assert_eq!(result.elements[1].block_number_delay, 4);
        assert_eq!(result.elements[1].block_timestamp_delay, 8);
    }

    #[test]
    fn shorten_sequence_does_not_transfer_when_dropping_the_first_element() {
        let seq = CallSequence::new(vec![
            CallSequenceElement::new(message(0), 5, 10, None),
            CallSequenceElement::new(message(0), 2, 3, None),
        ]);
        let mut mutator = RandomValues::new(StdRng::seed_from_u64(0));
        // Force dropping index 0 deterministically by trying until it happens;
        // with a 2-element sequence `gen_range(0..2)` is either 0 or 1, so a
        // handful of seeds suffices to exercise the `drop == 0` branch.
        let mut result = None;
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            if let Some(candidate) = shorten_sequence(&seq, &mut rng, &mut mutator) {
                if candidate.len() == 1 && candidate.elements[0].block_number_delay == 2 {
                    result = Some(candidate);
                    break;
                }
            }
        }
        let result = result.expect("some seed drops index 0 without transferring its delay onto the survivor");
        assert_eq!(result.elements[0].block_number_delay, 2);
        assert_eq!(result.elements[0].block_timestamp_delay, 3);
    }

    /// spec.md's worked example: a three-element sequence where element 1
    /// reverted, element 2 succeeded, element 3 reverted ⇒ `remove_reverts`
    /// returns `[elem2, elem3]` — the last element is always kept even
    /// though it reverted.
    #[test]
    fn remove_reverts_always_keeps_the_last_element_even_if_it_reverted() {
        let mut elem1 = CallSequenceElement::new(message(1), 0, 0, None);
        elem1.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let mut elem2 = CallSequenceElement::new(message(2), 0, 0, None);
        elem2.results = Some(MessageResults {
            execution_result: ExecutionResult::success(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let mut elem3 = CallSequenceElement::new(message(3), 0, 0, None);
        elem3.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let seq = CallSequence::new(vec![elem1, elem2, elem3]);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut mutator = RandomValues::new(StdRng::seed_from_u64(seed));
            let result = remove_reverts(&seq, &mut rng, &mut mutator).expect("a non-last revert exists");
            assert_eq!(result.len(), 2);
            assert_eq!(result.elements[0].call.value, U256::from(2u64));
            assert_eq!(result.elements[1].call.value, U256::from(3u64));
        }
    }

    #[test]
    fn remove_reverts_is_a_fixed_point_when_only_the_last_element_reverted() {
        let mut elem1 = CallSequenceElement::new(message(1), 0, 0, None);
        elem1.results = Some(MessageResults {
            execution_result: ExecutionResult::success(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let mut elem2 = CallSequenceElement::new(message(2), 0, 0, None);
        elem2.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let seq = CallSequence::new(vec![elem1, elem2]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut mutator = RandomValues::new(StdRng::seed_from_u64(0));
        assert!(remove_reverts(&seq, &mut rng, &mut mutator).is_none());
    }
}
