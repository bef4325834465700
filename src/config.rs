//! Fuzzer configuration (§6), following the teacher's `evm/config.rs` shape:
//! a plain struct plus small string-keyed enums for multi-choice fields.
use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Weights for the four corpus-mutation strategies (§4.2). Any strategy
/// whose corpus draw fails falls back to fresh synthesis regardless of
/// weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub interleave: f64,
    pub splice: f64,
    pub prepend: f64,
    pub append: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self { interleave: 1.0, splice: 1.0, prepend: 1.0, append: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzerConfig {
    pub worker_count: usize,
    pub transaction_gas_limit: u64,
    pub max_block_number_delay: u64,
    pub max_block_timestamp_delay: u64,
    pub sequence_length: usize,
    pub shrink_limit: u32,
    pub corpus_path: Option<String>,
    pub senders: Vec<Address>,
    pub property_test_prefixes: Vec<String>,
    pub optimization_test_prefixes: Vec<String>,
    pub test_view_methods: bool,
    #[serde(default)]
    pub strategy_weights: StrategyWeights,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            transaction_gas_limit: 12_500_000,
            max_block_number_delay: 60 * 60 * 24,
            max_block_timestamp_delay: 60 * 60 * 24 * 3,
            sequence_length: 100,
            shrink_limit: 5_000,
            corpus_path: None,
            senders: Vec::new(),
            property_test_prefixes: vec!["fuzz_".to_string(), "echidna_".to_string()],
            optimization_test_prefixes: vec!["optimize_".to_string()],
            test_view_methods: false,
            strategy_weights: StrategyWeights::default(),
        }
    }
}
