//! One fuzzing worker's per-sequence loop (§4.7): generate, replay against
//! the chain, check oracles, shrink on failure, and feed the corpus when
//! coverage increases. Each worker owns its own [`Chain`] instance — chains
//! are not shared, since every worker must be free to snapshot/revert
//! independently.
use crate::abi::{AbiMethod, ContractDefinition, Mutability};
use crate::activity::WorkerActivity;
use crate::chain::{Chain, ChainFatalError, ExecutionError};
use crate::config::FuzzerConfig;
use crate::corpus::Corpus;
use crate::generator::CallSequenceGenerator;
use crate::metrics::WorkerMetrics;
use crate::oracle::{TestCase, TestCaseKind, TestCaseStatus};
use crate::reversion::{decode_revert_reason, ReversionStatistics, SequenceRevertReport};
use crate::sequence::{CallMessage, CallSequence};
use crate::shrinker::{FailureSignature, Shrinker};
use crate::types::Address;
use crate::value::{ValueGenerator, ValueMutator};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one `run_one_sequence` pass, reported back to the owning
/// `Fuzzer` for aggregate bookkeeping.
#[derive(Debug, Clone)]
pub enum SequenceTested {
    /// Nothing notable: no oracle failed, coverage did not increase.
    NoChange,
    /// Coverage increased; the (possibly pre-shrink) sequence was added to
    /// the corpus.
    CoverageIncreased,
    /// An oracle failed; `test_case_index` identifies which one when the
    /// failure came from a named property, `None` for a bare revert.
    OracleFailed { test_case_index: Option<usize>, minimized: CallSequence },
    /// The chain simulator itself failed. Fatal: the worker stops (§7).
    ChainError(ChainFatalError),
}

/// Drives one worker's generate/execute/shrink loop against its own `Chain`.
pub struct FuzzerWorker<C: Chain> {
    pub id: usize,
    chain: C,
    contracts: Vec<ContractDefinition>,
    corpus: Arc<Corpus>,
    config: FuzzerConfig,
    activity: Arc<WorkerActivity>,
    metrics: Arc<WorkerMetrics>,
    reversion: Arc<ReversionStatistics>,
    test_cases: Arc<Mutex<Vec<TestCase>>>,
    generator: CallSequenceGenerator,
    fatal_error: Arc<Mutex<Option<ChainFatalError>>>,
}

impl<C: Chain> FuzzerWorker<C> {
    /// Builds a worker with its own private, unshared test-case list — handy
    /// for tests that only care about one worker's view.
    pub fn new(
        id: usize,
        chain: C,
        contracts: Vec<ContractDefinition>,
        corpus: Arc<Corpus>,
        config: FuzzerConfig,
        activity: Arc<WorkerActivity>,
        metrics: Arc<WorkerMetrics>,
        reversion: Arc<ReversionStatistics>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self::with_fatal_error_slot(
            id,
            chain,
            contracts,
            corpus,
            config,
            activity,
            metrics,
            reversion,
            Arc::new(Mutex::new(test_cases)),
            Arc::new(Mutex::new(None)),
        )
    }

    /// Like [`Self::new`], but `test_cases` is shared with the owning
    /// `Fuzzer` (so status changes are visible via `test_cases_with_status`)
    /// and `fatal_error` is shared too, so a `ChainFatalError` observed here
    /// surfaces on its error channel (§7).
    pub fn with_fatal_error_slot(
        id: usize,
        chain: C,
        contracts: Vec<ContractDefinition>,
        corpus: Arc<Corpus>,
        config: FuzzerConfig,
        activity: Arc<WorkerActivity>,
        metrics: Arc<WorkerMetrics>,
        reversion: Arc<ReversionStatistics>,
        test_cases: Arc<Mutex<Vec<TestCase>>>,
        fatal_error: Arc<Mutex<Option<ChainFatalError>>>,
    ) -> Self {
        let generator = CallSequenceGenerator::new(&config);
        Self {
            id,
            chain,
            contracts,
            corpus,
            config,
            activity,
            metrics,
            reversion,
            test_cases,
            generator,
            fatal_error,
        }
    }

    pub fn test_cases(&self) -> Vec<TestCase> {
        self.test_cases.lock().clone()
    }

    /// Runs sequences until `stop` is set, or until a chain-fatal error is
    /// observed — which also flips `stop`, so sibling workers wind down too.
    pub fn run<R: Rng, V: ValueGenerator + ValueMutator>(&mut self, stop: &AtomicBool, rng: &mut R, values: &mut V) {
        while !stop.load(Ordering::Relaxed) {
            if let SequenceTested::ChainError(err) = self.run_one_sequence(rng, values) {
                let mut slot = self.fatal_error.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
                drop(slot);
                stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    /// One full generate -> execute -> oracle-check -> (maybe shrink) pass.
    pub fn run_one_sequence<R: Rng, V: ValueGenerator + ValueMutator>(&mut self, rng: &mut R, values: &mut V) -> SequenceTested {
        let base_snapshot = self.chain.snapshot();

        let draft = match self.generator.new_sequence(&self.contracts, &self.corpus, &self.config, rng, values, &self.activity) {
            Ok(seq) => seq,
            Err(_) => return SequenceTested::NoChange,
        };

        self.activity.set_replaying(-1);
        let mut executed = Vec::with_capacity(draft.len());
        let mut coverage_increased = false;
        let mut revert_failure: Option<FailureSignature> = None;

        for (index, mut element) in draft.elements.into_iter().enumerate() {
            let results = match self.chain.execute(&element.call, element.block_number_delay, element.block_timestamp_delay) {
                Ok(results) => results,
                Err(err) => {
                    self.chain.revert_to(&base_snapshot);
                    self.activity.set_idle();
                    return SequenceTested::ChainError(err);
                }
            };
            self.metrics.record_call(results.execution_result.gas_used);
            if self.corpus.coverage_maps().record(&results.coverage_delta.new_edges) {
                coverage_increased = true;
            }
            if revert_failure.is_none() && matches!(results.execution_result.err, Some(ExecutionError::Revert)) {
                revert_failure = Some(FailureSignature::RevertAt {
                    element_index: index,
                    reason: decode_revert_reason(&results.execution_result.return_data),
                });
            }
            element.results = Some(results);
            executed.push(element);
        }

        self.metrics.record_sequence();
        let tested = CallSequence::new(executed);
        self.reversion.submit(SequenceRevertReport::from_sequence(&tested));

        let property_failure = self.check_property_test_cases();

        let failure_signature = property_failure
            .as_ref()
            .map(|(_, signature)| signature.clone())
            .or_else(|| revert_failure.clone());

        let outcome = if let Some(signature) = failure_signature {
            match self.shrink_and_record(tested, &signature, rng, values, &base_snapshot) {
                Ok(minimized) => {
                    let test_case_index = self.record_failure(property_failure.map(|(i, _)| i), &signature, &minimized);
                    SequenceTested::OracleFailed { test_case_index, minimized }
                }
                Err(err) => {
                    self.chain.revert_to(&base_snapshot);
                    self.activity.set_idle();
                    return SequenceTested::ChainError(err);
                }
            }
        } else if coverage_increased {
            self.corpus.add_sequence(tested);
            SequenceTested::CoverageIncreased
        } else {
            SequenceTested::NoChange
        };

        self.chain.revert_to(&base_snapshot);
        self.activity.set_idle();
        outcome
    }

    fn shrink_and_record<R: Rng, V: ValueMutator>(
        &mut self,
        failing: CallSequence,
        target: &FailureSignature,
        rng: &mut R,
        mutator: &mut V,
        base_snapshot: &C::Snapshot,
    ) -> Result<CallSequence, ChainFatalError> {
        let shrinker = Shrinker::new(self.config.shrink_limit, &self.activity);
        let shrunk = shrinker.shrink(&mut self.chain, base_snapshot, failing.clone(), target, None, rng, mutator)?;
        self.corpus.add_sequence(shrunk.clone());
        Ok(shrunk)
    }

    /// Marks the `TestCase` that failed as `Failed` and attaches the
    /// minimized reproducer (§6). For a named property this is the test
    /// case `check_property_test_cases` already identified; for a bare
    /// revert (no named property involved) an `Assertion`-kind test case is
    /// synthesized the first time that call site is observed to fail, per
    /// `oracle::TestCaseProvider`'s doc comment. Returns the index of the
    /// test case that was updated.
    fn record_failure(&mut self, test_case_index: Option<usize>, signature: &FailureSignature, minimized: &CallSequence) -> Option<usize> {
        let message = match signature {
            FailureSignature::PropertyFalsified { test_case } => format!("property `{test_case}` was falsified"),
            FailureSignature::RevertAt { element_index, reason } => format!("call at index {element_index} reverted: {reason}"),
        };
        let mut test_cases = self.test_cases.lock();
        if let Some(index) = test_case_index {
            test_cases[index].mark_failed(minimized.clone(), message);
            return Some(index);
        }

        let FailureSignature::RevertAt { element_index, .. } = signature else {
            return None;
        };
        let element = minimized.elements.get(*element_index)?;
        let contract = element.contract?;
        let method = self.method_called_by(contract, &element.call).unwrap_or_else(|| synthetic_assertion_method(&element.call));
        let mut case = TestCase::new(contract, method, TestCaseKind::Assertion);
        case.mark_failed(minimized.clone(), message);
        test_cases.push(case);
        Some(test_cases.len() - 1)
    }

    fn method_called_by(&self, contract: Address, call: &CallMessage) -> Option<AbiMethod> {
        if call.data.len() < 4 {
            return None;
        }
        self.contracts
            .iter()
            .find(|c| c.address == contract)?
            .methods
            .iter()
            .find(|m| m.selector[..] == call.data[..4])
            .cloned()
    }

    /// Executes every `Property`-kind test case's zero-argument check call
    /// and reports the first one whose boolean result is `false`.
    fn check_property_test_cases(&mut self) -> Option<(usize, FailureSignature)> {
        let test_cases = self.test_cases.lock();
        for (index, case) in test_cases.iter().enumerate() {
            if case.kind != TestCaseKind::Property || case.status != TestCaseStatus::Fuzzing {
                continue;
            }
            let message = CallMessage {
                sender: crate::types::Address::zero(),
                recipient: Some(case.contract),
                nonce: 0,
                value: crate::types::EvmU256::zero(),
                gas_limit: self.config.transaction_gas_limit,
                gas_price: crate::types::EvmU256::zero(),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                data: case.method.selector.to_vec(),
                data_abi: None,
            };
            let results = match self.chain.execute(&message, 0, 0) {
                Ok(results) => results,
                Err(_) => continue,
            };
            if matches!(results.execution_result.err, Some(ExecutionError::Revert)) {
                return Some((index, FailureSignature::PropertyFalsified { test_case: case.method.name.clone() }));
            }
            if let Ok(tokens) = ethers::abi::decode(&[ethers::abi::ParamType::Bool], &results.execution_result.return_data) {
                if let Some(ethers::abi::Token::Bool(false)) = tokens.into_iter().next() {
                    return Some((index, FailureSignature::PropertyFalsified { test_case: case.method.name.clone() }));
                }
            }
        }
        None
    }
}

/// Builds a placeholder method descriptor for an assertion-kind test case
/// whose call site could not be matched back to a known ABI entry (e.g. a
/// call synthesized by the generator against a selector not present in the
/// loaded ABI). Carries the raw selector so the failure is still attributable.
fn synthetic_assertion_method(call: &CallMessage) -> AbiMethod {
    let mut method = AbiMethod::new("<assertion>", vec![], vec![], Mutability::NonPayable);
    if call.data.len() >= 4 {
        method.selector.copy_from_slice(&call.data[..4]);
    }
    method
}
