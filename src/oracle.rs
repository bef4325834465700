//! Test-case discovery and classification (§6): a `TestCaseProvider`
//! surfaces the property/assertion/optimization methods a campaign should
//! check after every sequence, classified purely from name prefix the way
//! the teacher's `EVM_Fuzzer` mode-detection does.
use crate::abi::AbiMethod;
use crate::config::FuzzerConfig;
use crate::sequence::CallSequence;
use crate::types::Address;
use ethers::abi::ParamType;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseStatus {
    Fuzzing,
    Passed,
    Failed,
}

/// What kind of check a discovered method represents (§6 classification
/// table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseKind {
    /// Boolean-returning property/invariant check (`fuzz_`, `echidna_`, …).
    Property,
    /// A Solidity `assert`-style check embedded directly in contract logic;
    /// detected only by its revert reason at call time, not by name, so it
    /// has no prefix classification here.
    Assertion,
    /// Optimization target: maximize the returned integer (`optimize_`).
    Optimization,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub contract: Address,
    pub method: AbiMethod,
    pub kind: TestCaseKind,
    pub status: TestCaseStatus,
    /// The minimized sequence that reproduces the failure, attached once
    /// `status` becomes `Failed` (§6: "attached to the TestCase entry").
    pub failing_sequence: Option<CallSequence>,
    /// A human-readable description of the failure, set alongside
    /// `failing_sequence`.
    pub failure_message: Option<String>,
}

impl TestCase {
    pub fn new(contract: Address, method: AbiMethod, kind: TestCaseKind) -> Self {
        Self { contract, method, kind, status: TestCaseStatus::Fuzzing, failing_sequence: None, failure_message: None }
    }

    pub fn mark_failed(&mut self, sequence: CallSequence, message: String) {
        self.status = TestCaseStatus::Failed;
        self.failing_sequence = Some(sequence);
        self.failure_message = Some(message);
    }
}

/// Classifies a method against the configured property/optimization
/// prefixes (§6). A prefix match alone is not enough: a property test must
/// take no inputs and return a single `bool`, and an optimization test must
/// take no inputs and return a single `int256`. A method whose name matches
/// a prefix but whose signature doesn't fit is logged and treated as an
/// ordinary (non-test) method rather than silently miscategorized.
pub fn classify_method(method: &AbiMethod, config: &FuzzerConfig) -> Option<TestCaseKind> {
    let name = method.name.as_str();
    if config.optimization_test_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
        if method.inputs.is_empty() && method.outputs == [ParamType::Int(256)] {
            return Some(TestCaseKind::Optimization);
        }
        warn!(method = name, "optimization-test prefix matched but signature is not `() -> int256`; skipping");
        return None;
    }
    if config.property_test_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
        if method.inputs.is_empty() && method.outputs == [ParamType::Bool] {
            return Some(TestCaseKind::Property);
        }
        warn!(method = name, "property-test prefix matched but signature is not `() -> bool`; skipping");
        return None;
    }
    None
}

/// Discovers test cases across a set of contracts by scanning their ABI
/// methods for recognized prefixes (§6). Assertion-kind test cases are not
/// discovered this way — they are synthesized by the worker the first time
/// an assertion-style revert is observed.
pub trait TestCaseProvider {
    fn discover(&self, config: &FuzzerConfig) -> Vec<TestCase>;
}

pub struct ContractScanProvider<'a> {
    pub contracts: &'a [crate::abi::ContractDefinition],
}

impl<'a> TestCaseProvider for ContractScanProvider<'a> {
    fn discover(&self, config: &FuzzerConfig) -> Vec<TestCase> {
        let mut cases = Vec::new();
        for contract in self.contracts {
            for method in &contract.methods {
                if let Some(kind) = classify_method(method, config) {
                    cases.push(TestCase::new(contract.address, method.clone(), kind));
                }
            }
        }
        cases
    }
}
