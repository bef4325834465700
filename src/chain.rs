//! The `Chain` interface (§6): an EVM-like execution environment, treated as
//! an external collaborator. The core only needs to execute a message and
//! snapshot/revert state; everything about how the EVM actually works is
//! out of scope.
use crate::sequence::CallMessage;
use crate::types::EvmU256;

/// Coverage newly observed by a single execution, as a set of opaque edge
/// ids. The aggregate coverage map (§4.1) is commutative/associative under
/// union, so workers can merge in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageDelta {
    pub new_edges: Vec<u64>,
}

impl CoverageDelta {
    pub fn increased_coverage(&self) -> bool {
        !self.new_edges.is_empty()
    }
}

/// Why a call did not return normally. Only `Revert` participates in
/// reversion-statistics accounting (§4.6) and shrinker soundness checks
/// (§4.4); other errors are disregarded by both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    Revert,
    OutOfGas,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub err: Option<ExecutionError>,
    pub return_data: Vec<u8>,
    pub gas_used: u64,
}

impl ExecutionResult {
    pub fn success(return_data: Vec<u8>, gas_used: u64) -> Self {
        Self { err: None, return_data, gas_used }
    }

    pub fn reverted(return_data: Vec<u8>, gas_used: u64) -> Self {
        Self { err: Some(ExecutionError::Revert), return_data, gas_used }
    }
}

#[derive(Debug, Clone)]
pub struct MessageResults {
    pub execution_result: ExecutionResult,
    pub coverage_delta: CoverageDelta,
}

/// A fatal chain error: the simulator itself failed or its state became
/// inconsistent. Per §7, this is never recoverable — it propagates to the
/// worker's caller and stops the campaign.
#[derive(Debug, Clone)]
pub struct ChainFatalError(pub String);

impl std::fmt::Display for ChainFatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chain fatal error: {}", self.0)
    }
}

impl std::error::Error for ChainFatalError {}

/// The execution environment a `FuzzerWorker` drives. Implementations are
/// expected to be cheap to snapshot/revert (e.g. backed by an in-memory
/// journaled state), since the shrinker re-executes every proposal from a
/// fresh snapshot (§4.4).
pub trait Chain {
    type Snapshot: Clone;

    fn execute(
        &mut self,
        msg: &CallMessage,
        block_number_delay: u64,
        block_timestamp_delay: u64,
    ) -> Result<MessageResults, ChainFatalError>;

    fn snapshot(&self) -> Self::Snapshot;
    fn revert_to(&mut self, snapshot: &Self::Snapshot);

    fn block_number(&self) -> u64;
    fn block_timestamp(&self) -> u64;
    fn base_fee(&self) -> EvmU256;
    fn block_gas_limit(&self) -> u64;
    fn next_nonce(&self, sender: crate::types::Address) -> u64;
}

/// A minimal in-memory test double implementing [`Chain`], used by this
/// crate's own tests and suitable as a starting point for integrators who
/// do not yet have a real EVM wired in. Execution is a pure function of a
/// user-supplied oracle closure over the message and running block state;
/// it does not interpret bytecode.
pub mod mock {
    use super::*;
    use crate::types::Address;
    use std::collections::HashMap;

    /// Decides the outcome of a call against a [`MockChain`]. Given the
    /// message and the chain's current block number/timestamp, returns the
    /// results to record.
    pub type Oracle = dyn Fn(&CallMessage, u64, u64) -> MessageResults + Send + Sync;

    pub struct MockChain {
        block_number: u64,
        block_timestamp: u64,
        gas_limit: u64,
        base_fee: EvmU256,
        nonces: HashMap<Address, u64>,
        oracle: Box<Oracle>,
    }

    #[derive(Debug, Clone)]
    pub struct MockSnapshot {
        block_number: u64,
        block_timestamp: u64,
        nonces: HashMap<Address, u64>,
    }

    impl MockChain {
        pub fn new(oracle: Box<Oracle>) -> Self {
            Self {
                block_number: 1,
                block_timestamp: 1,
                gas_limit: 30_000_000,
                base_fee: EvmU256::from(1_000_000_000u64),
                nonces: HashMap::new(),
                oracle,
            }
        }
    }

    impl Chain for MockChain {
        type Snapshot = MockSnapshot;

        fn execute(
            &mut self,
            msg: &CallMessage,
            block_number_delay: u64,
            block_timestamp_delay: u64,
        ) -> Result<MessageResults, ChainFatalError> {
            self.block_number += block_number_delay;
            self.block_timestamp += block_timestamp_delay;
            *self.nonces.entry(msg.sender).or_insert(0) += 1;
            Ok((self.oracle)(msg, self.block_number, self.block_timestamp))
        }

        fn snapshot(&self) -> Self::Snapshot {
            MockSnapshot {
                block_number: self.block_number,
                block_timestamp: self.block_timestamp,
                nonces: self.nonces.clone(),
            }
        }

        fn revert_to(&mut self, snapshot: &Self::Snapshot) {
            self.block_number = snapshot.block_number;
            self.block_timestamp = snapshot.block_timestamp;
            self.nonces = snapshot.nonces.clone();
        }

        fn block_number(&self) -> u64 {
            self.block_number
        }

        fn block_timestamp(&self) -> u64 {
            self.block_timestamp
        }

        fn base_fee(&self) -> EvmU256 {
            self.base_fee
        }

        fn block_gas_limit(&self) -> u64 {
            self.gas_limit
        }

        fn next_nonce(&self, sender: Address) -> u64 {
            self.nonces.get(&sender).copied().unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChain;
    use super::*;
    use crate::types::Address;

    fn message(sender: Address) -> CallMessage {
        CallMessage {
            sender,
            recipient: None,
            nonce: 0,
            value: EvmU256::zero(),
            gas_limit: 21_000,
            gas_price: EvmU256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data: vec![],
            data_abi: None,
        }
    }

    #[test]
    fn snapshot_revert_restores_block_state() {
        let mut chain = MockChain::new(Box::new(|_, _, _| MessageResults {
            execution_result: ExecutionResult::success(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        }));
        let snap = chain.snapshot();
        chain.execute(&message(Address::zero()), 5, 10).unwrap();
        assert_eq!(chain.block_number(), 6);
        chain.revert_to(&snap);
        assert_eq!(chain.block_number(), 1);
    }
}
