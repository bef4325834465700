//! Content-addressed corpus of interesting call sequences plus scalar seed
//! pools (§4.1). Shared by pointer across workers; every mutating operation
//! is internally synchronized via `parking_lot` locks (adopted from the
//! wider pack's `foundry-evm-fuzz`, which locks exactly this kind of shared
//! fuzzing state — the teacher itself never reaches for `parking_lot`).
mod seed_ast;

pub use seed_ast::seed_from_ast;

use crate::sequence::CallSequence;
use num_bigint::BigInt;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use sha3::{Digest, Sha3_256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Aggregate coverage bitmap (§3: "exposes `branches_hit(): u64`"). Modeled
/// as a set of opaque edge ids rather than a literal bit array, since the
/// `Chain` only promises opaque edge ids via `CoverageDelta`.
#[derive(Default)]
pub struct CoverageMap {
    edges: Mutex<HashSet<u64>>,
    hit_count: AtomicU64,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records newly observed edges, returning whether any of them were
    /// actually new (i.e. whether coverage increased).
    pub fn record(&self, new_edges: &[u64]) -> bool {
        if new_edges.is_empty() {
            return false;
        }
        let mut edges = self.edges.lock();
        let mut increased = false;
        for edge in new_edges {
            if edges.insert(*edge) {
                increased = true;
            }
        }
        if increased {
            self.hit_count.store(edges.len() as u64, Ordering::Relaxed);
        }
        increased
    }

    pub fn branches_hit(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct Corpus {
    mutable_sequences: RwLock<Vec<Arc<CallSequence>>>,
    fingerprints: Mutex<HashSet<[u8; 32]>>,
    coverage: CoverageMap,
    integers: RwLock<HashMap<String, BigInt>>,
    strings: RwLock<HashMap<String, String>>,
    bytes: RwLock<HashMap<String, Vec<u8>>>,
    initializing: AtomicBool,
}

impl Corpus {
    pub fn new() -> Self {
        let corpus = Self::default();
        corpus.initializing.store(true, Ordering::Relaxed);
        corpus
    }

    /// True while the corpus is still replaying its on-disk seed (on-disk
    /// persistence itself is out of scope here; callers flip this once
    /// their own seeding pass is done).
    pub fn initializing_corpus(&self) -> bool {
        self.initializing.load(Ordering::Relaxed)
    }

    pub fn finish_initializing(&self) {
        self.initializing.store(false, Ordering::Relaxed);
    }

    /// Idempotent insert keyed by decimal representation (§3, §8: "Corpus
    /// keying").
    pub fn add_integer(&self, n: BigInt) {
        let key = n.to_string();
        self.integers.write().entry(key).or_insert(n);
    }

    pub fn add_string(&self, s: String) {
        self.strings.write().entry(s.clone()).or_insert(s);
    }

    /// Idempotent insert keyed by lowercase hex SHA3-256 (§3, §8: "Corpus
    /// dedup").
    pub fn add_bytes(&self, b: Vec<u8>) {
        let mut hasher = Sha3_256::new();
        hasher.update(&b);
        let digest: [u8; 32] = hasher.finalize().into();
        let key = hex::encode(digest);
        self.bytes.write().entry(key).or_insert(b);
    }

    pub fn integers(&self) -> Vec<BigInt> {
        self.integers.read().values().cloned().collect()
    }

    pub fn strings(&self) -> Vec<String> {
        self.strings.read().values().cloned().collect()
    }

    pub fn bytes(&self) -> Vec<Vec<u8>> {
        self.bytes.read().values().cloned().collect()
    }

    /// Fingerprints the sequence (§4.1) and inserts it only if unseen.
    /// Returns whether it was actually added.
    pub fn add_sequence(&self, seq: CallSequence) -> bool {
        let fingerprint = seq.fingerprint();
        let mut fingerprints = self.fingerprints.lock();
        if !fingerprints.insert(fingerprint) {
            return false;
        }
        self.mutable_sequences.write().push(Arc::new(seq));
        true
    }

    pub fn random_mutable_sequence<R: Rng>(&self, rng: &mut R) -> Option<Arc<CallSequence>> {
        let sequences = self.mutable_sequences.read();
        if sequences.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..sequences.len());
        Some(sequences[idx].clone())
    }

    pub fn active_mutable_sequence_count(&self) -> usize {
        self.mutable_sequences.read().len()
    }

    pub fn coverage_maps(&self) -> &CoverageMap {
        &self.coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{CallMessage, CallSequenceElement};
    use ethers::types::{H160, U256};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn message(sender: u64, value: u64) -> CallMessage {
        CallMessage {
            sender: H160::from_low_u64_be(sender),
            recipient: None,
            nonce: 0,
            value: U256::from(value),
            gas_limit: 1_000_000,
            gas_price: U256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data: vec![],
            data_abi: None,
        }
    }

    #[test]
    fn adding_same_bytes_twice_dedups() {
        let corpus = Corpus::new();
        corpus.add_bytes(vec![1, 2, 3]);
        corpus.add_bytes(vec![1, 2, 3]);
        assert_eq!(corpus.bytes().len(), 1);
    }

    #[test]
    fn integers_with_equal_decimal_repr_collapse() {
        let corpus = Corpus::new();
        corpus.add_integer(BigInt::from(7));
        corpus.add_integer(BigInt::from(7));
        corpus.add_integer(BigInt::from(13));
        let values = corpus.integers();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&BigInt::from(7)));
        assert!(values.contains(&BigInt::from(13)));
    }

    #[test]
    fn duplicate_sequences_are_dropped() {
        let corpus = Corpus::new();
        let seq = CallSequence::new(vec![CallSequenceElement::new(message(1, 1), 0, 0, None)]);
        assert!(corpus.add_sequence(seq.clone()));
        assert!(!corpus.add_sequence(seq));
        assert_eq!(corpus.active_mutable_sequence_count(), 1);
    }

    #[test]
    fn random_draw_returns_existing_entry() {
        let corpus = Corpus::new();
        let seq = CallSequence::new(vec![CallSequenceElement::new(message(2, 0), 0, 0, None)]);
        corpus.add_sequence(seq);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(corpus.random_mutable_sequence(&mut rng).is_some());
    }

    #[test]
    fn coverage_reports_branches_hit() {
        let corpus = Corpus::new();
        assert!(corpus.coverage_maps().record(&[1, 2, 3]));
        assert!(!corpus.coverage_maps().record(&[1, 2]));
        assert_eq!(corpus.coverage_maps().branches_hit(), 3);
    }
}
