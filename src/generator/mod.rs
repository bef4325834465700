//! Builds new [`CallSequence`]s (§4.2): each draft is either populated from
//! a corpus-mutation strategy (see [`strategy`]) or synthesized element by
//! element from scratch.
pub mod strategy;

pub use strategy::{BaseSlot, WeightedRandomChooser};

use crate::abi::{AbiMethod, ContractDefinition};
use crate::activity::WorkerActivity;
use crate::config::FuzzerConfig;
use crate::corpus::Corpus;
use crate::sequence::{AbiCall, CallMessage, CallSequence, CallSequenceElement};
use crate::types::Address;
use crate::value::ValueGenerator;
use rand::Rng;
use strategy::populate_from_corpus;

#[derive(Debug, Clone)]
pub enum GeneratorError {
    /// No contract exposes a method eligible under the current
    /// configuration (state-changing, or any method if
    /// `test_view_methods` is set).
    NoEligibleMethods,
    /// `contracts` was empty.
    NoContracts,
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorError::NoEligibleMethods => write!(f, "no contract method is eligible for generation"),
            GeneratorError::NoContracts => write!(f, "no contracts available to target"),
        }
    }
}

impl std::error::Error for GeneratorError {}

struct EligibleTarget<'a> {
    contract: &'a ContractDefinition,
    method: &'a AbiMethod,
}

fn eligible_targets<'a>(contracts: &'a [ContractDefinition], test_view_methods: bool) -> Vec<EligibleTarget<'a>> {
    let mut targets = Vec::new();
    for contract in contracts {
        for method in &contract.methods {
            if method.mutability.is_state_changing() || test_view_methods {
                targets.push(EligibleTarget { contract, method });
            }
        }
    }
    targets
}

/// Builds new call sequences by combining corpus-mutation strategies with
/// from-scratch synthesis of any slot a strategy leaves empty (§4.2).
pub struct CallSequenceGenerator {
    chooser: WeightedRandomChooser,
}

impl CallSequenceGenerator {
    pub fn new(config: &FuzzerConfig) -> Self {
        Self { chooser: WeightedRandomChooser::new(&config.strategy_weights) }
    }

    /// Builds one full sequence (§4.2 steps 1-7):
    /// 1. choose a strategy
    /// 2. populate as many base slots as the strategy can supply from the
    ///    corpus
    /// 3-7. synthesize the remaining (`Empty`) slots fresh, enforcing the
    ///    block-delay invariant element by element.
    pub fn new_sequence<R: Rng, V: ValueGenerator>(
        &self,
        contracts: &[ContractDefinition],
        corpus: &Corpus,
        config: &FuzzerConfig,
        rng: &mut R,
        values: &mut V,
        activity: &WorkerActivity,
    ) -> Result<CallSequence, GeneratorError> {
        if contracts.is_empty() {
            return Err(GeneratorError::NoContracts);
        }
        let targets = eligible_targets(contracts, config.test_view_methods);
        if targets.is_empty() {
            return Err(GeneratorError::NoEligibleMethods);
        }

        let strategy = self.chooser.choose(rng);
        activity.set_generating(strategy);
        let slots = populate_from_corpus(strategy, corpus, rng, config.sequence_length)
            .unwrap_or_else(|| vec![BaseSlot::Empty; config.sequence_length]);

        let mut elements = Vec::with_capacity(slots.len());
        for slot in slots {
            elements.push(self.generate_element(slot, &targets, config, rng, values));
        }
        activity.set_idle();
        Ok(CallSequence::new(elements))
    }

    fn generate_element<R: Rng, V: ValueGenerator>(
        &self,
        slot: BaseSlot,
        targets: &[EligibleTarget<'_>],
        config: &FuzzerConfig,
        rng: &mut R,
        values: &mut V,
    ) -> CallSequenceElement {
        match slot {
            BaseSlot::Prefilled(element) => element,
            BaseSlot::Empty => self.generate_new_element(targets, config, rng, values),
        }
    }

    /// Synthesizes one brand-new element: picks a target method, fills its
    /// arguments, picks a sender and value, and draws delays that satisfy
    /// the invariant carried on [`CallSequenceElement`] (§3: a nonzero block
    /// number delay requires a nonzero timestamp delay at least as large).
    fn generate_new_element<R: Rng, V: ValueGenerator>(
        &self,
        targets: &[EligibleTarget<'_>],
        config: &FuzzerConfig,
        rng: &mut R,
        values: &mut V,
    ) -> CallSequenceElement {
        let target = &targets[rng.gen_range(0..targets.len())];
        let input_values = target.method.inputs.iter().map(|ty| values.generate_abi_value(ty)).collect();
        let abi_call = AbiCall { method: target.method.clone(), input_values };
        let data = abi_call.encode();

        let sender = pick_sender(config, rng);
        let value = if target.method.is_payable() {
            crate::types::EvmU256::from(rng.gen_range(0..=u64::MAX))
        } else {
            crate::types::EvmU256::zero()
        };

        let timestamp_delay = rng.gen_range(0..=config.max_block_timestamp_delay);
        let number_delay = if timestamp_delay == 0 {
            0
        } else {
            rng.gen_range(0..=config.max_block_number_delay.min(timestamp_delay))
        };

        let call = CallMessage {
            sender,
            recipient: Some(target.contract.address),
            nonce: 0,
            value,
            gas_limit: config.transaction_gas_limit,
            gas_price: crate::types::EvmU256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data,
            data_abi: Some(abi_call),
        };
        CallSequenceElement::new(call, number_delay, timestamp_delay, Some(target.contract.address))
    }
}

fn pick_sender<R: Rng>(config: &FuzzerConfig, rng: &mut R) -> Address {
    if config.senders.is_empty() {
        Address::zero()
    } else {
        config.senders[rng.gen_range(0..config.senders.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Mutability;
    use crate::value::RandomValues;
    use ethers::abi::ParamType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn contract() -> ContractDefinition {
        ContractDefinition {
            address: Address::from_low_u64_be(1),
            methods: vec![
                AbiMethod::new("setValue", vec![ParamType::Uint(256)], vec![], Mutability::NonPayable),
                AbiMethod::new("getValue", vec![], vec![ParamType::Uint(256)], Mutability::View),
            ],
        }
    }

    #[test]
    fn fresh_generation_only_targets_state_changing_methods_by_default() {
        let contracts = vec![contract()];
        let corpus = Corpus::new();
        let config = FuzzerConfig { sequence_length: 4, ..FuzzerConfig::default() };
        let generator = CallSequenceGenerator::new(&config);
        let mut rng = StdRng::seed_from_u64(0);
        let mut values = RandomValues::new(StdRng::seed_from_u64(1));
        let activity = WorkerActivity::new();
        let seq = generator.new_sequence(&contracts, &corpus, &config, &mut rng, &mut values, &activity).unwrap();
        assert_eq!(seq.len(), 4);
        for element in &seq.elements {
            let method = &element.call.data_abi.as_ref().unwrap().method;
            assert_eq!(method.name, "setValue");
            assert!(element.delay_invariant_holds());
        }
    }

    #[test]
    fn no_contracts_is_an_error() {
        let corpus = Corpus::new();
        let config = FuzzerConfig::default();
        let generator = CallSequenceGenerator::new(&config);
        let mut rng = StdRng::seed_from_u64(0);
        let mut values = RandomValues::new(StdRng::seed_from_u64(1));
        let activity = WorkerActivity::new();
        let result = generator.new_sequence(&[], &corpus, &config, &mut rng, &mut values, &activity);
        assert!(matches!(result, Err(GeneratorError::NoContracts)));
    }

    #[test]
    fn view_methods_only_contract_requires_test_view_methods_flag() {
        let contracts = vec![ContractDefinition {
            address: Address::from_low_u64_be(2),
            methods: vec![AbiMethod::new("getValue", vec![], vec![ParamType::Uint(256)], Mutability::View)],
        }];
        let corpus = Corpus::new();
        let config = FuzzerConfig::default();
        let generator = CallSequenceGenerator::new(&config);
        let mut rng = StdRng::seed_from_u64(0);
        let mut values = RandomValues::new(StdRng::seed_from_u64(1));
        let activity = WorkerActivity::new();
        let result = generator.new_sequence(&contracts, &corpus, &config, &mut rng, &mut values, &activity);
        assert!(matches!(result, Err(GeneratorError::NoEligibleMethods)));

        let config_with_views = FuzzerConfig { test_view_methods: true, ..FuzzerConfig::default() };
        let result = generator.new_sequence(&contracts, &corpus, &config_with_views, &mut rng, &mut values, &activity);
        assert!(result.is_ok());
    }

    #[test]
    fn zero_timestamp_delay_forces_zero_number_delay() {
        let contracts = vec![contract()];
        let corpus = Corpus::new();
        let config = FuzzerConfig { max_block_timestamp_delay: 0, max_block_number_delay: 100, sequence_length: 10, ..FuzzerConfig::default() };
        let generator = CallSequenceGenerator::new(&config);
        let mut rng = StdRng::seed_from_u64(7);
        let mut values = RandomValues::new(StdRng::seed_from_u64(8));
        let activity = WorkerActivity::new();
        let seq = generator.new_sequence(&contracts, &corpus, &config, &mut rng, &mut values, &activity).unwrap();
        for element in &seq.elements {
            assert_eq!(element.block_timestamp_delay, 0);
            assert_eq!(element.block_number_delay, 0);
        }
    }
}
