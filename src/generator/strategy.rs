//! Mutation strategies (§2.4, §4.2): `interleave`, `splice`, `prepend`,
//! `append`, each combining a draft sequence with one or more corpus
//! sequences. Selection is a weighted draw (`WeightedRandomChooser`); if the
//! chosen strategy cannot be satisfied, the generator falls back to fully
//! fresh synthesis.
use crate::activity::StrategyKind;
use crate::config::StrategyWeights;
use crate::corpus::Corpus;
use crate::sequence::CallSequenceElement;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// One slot of the generator's `base_sequence` (§4.2, §9: "no coroutines" —
/// this is the explicit state a strategy populates instead of a generator
/// closure).
#[derive(Clone)]
pub enum BaseSlot {
    /// Synthesize fresh at `generate_element()` time.
    Empty,
    /// Pre-filled from a corpus-mutation strategy.
    Prefilled(CallSequenceElement),
}

/// Picks exactly one strategy per `new_sequence` call, weighted by
/// `StrategyWeights`.
pub struct WeightedRandomChooser {
    kinds: Vec<StrategyKind>,
    index: WeightedIndex<f64>,
}

impl WeightedRandomChooser {
    pub fn new(weights: &StrategyWeights) -> Self {
        let kinds = vec![StrategyKind::Interleave, StrategyKind::Splice, StrategyKind::Prepend, StrategyKind::Append];
        let raw = vec![weights.interleave, weights.splice, weights.prepend, weights.append];
        let index = WeightedIndex::new(raw).expect("at least one strategy weight must be positive");
        Self { kinds, index }
    }

    pub fn choose<R: Rng>(&self, rng: &mut R) -> StrategyKind {
        self.kinds[self.index.sample(rng)]
    }
}

/// Attempts to populate `length` base slots using `strategy`. Returns `None`
/// if the strategy cannot be satisfied (e.g. an empty corpus), in which
/// case the caller falls back to all-`Empty` (fresh synthesis).
pub fn populate_from_corpus<R: Rng>(strategy: StrategyKind, corpus: &Corpus, rng: &mut R, length: usize) -> Option<Vec<BaseSlot>> {
    match strategy {
        StrategyKind::Interleave => interleave(corpus, rng, length),
        StrategyKind::Splice => splice(corpus, rng, length),
        StrategyKind::Prepend => prepend(corpus, rng, length),
        StrategyKind::Append => append(corpus, rng, length),
        StrategyKind::Fresh | StrategyKind::None => None,
    }
}

/// Merges two corpus sequences element-by-element at a random alternation
/// pattern: for each output index, flip a coin to decide which source
/// sequence supplies it (falling back to `Empty` once a source is
/// exhausted).
fn interleave<R: Rng>(corpus: &Corpus, rng: &mut R, length: usize) -> Option<Vec<BaseSlot>> {
    let a = corpus.random_mutable_sequence(rng)?;
    let b = corpus.random_mutable_sequence(rng)?;
    let mut slots = Vec::with_capacity(length);
    for _ in 0..length {
        let from_a = rng.gen_bool(0.5);
        let (primary, secondary) = if from_a { (&a, &b) } else { (&b, &a) };
        slots.push(pick_next(primary, secondary, slots.len()));
    }
    Some(slots)
}

fn pick_next(primary: &crate::sequence::CallSequence, secondary: &crate::sequence::CallSequence, idx: usize) -> BaseSlot {
    if let Some(e) = primary.elements.get(idx) {
        BaseSlot::Prefilled(e.clone())
    } else if let Some(e) = secondary.elements.get(idx) {
        BaseSlot::Prefilled(e.clone())
    } else {
        BaseSlot::Empty
    }
}

/// Takes a prefix of one corpus sequence and a suffix of another.
fn splice<R: Rng>(corpus: &Corpus, rng: &mut R, length: usize) -> Option<Vec<BaseSlot>> {
    let prefix_source = corpus.random_mutable_sequence(rng)?;
    let suffix_source = corpus.random_mutable_sequence(rng)?;
    let cut = if length == 0 { 0 } else { rng.gen_range(0..=length) };
    let mut slots = Vec::with_capacity(length);
    for i in 0..cut {
        slots.push(match prefix_source.elements.get(i) {
            Some(e) => BaseSlot::Prefilled(e.clone()),
            None => BaseSlot::Empty,
        });
    }
    for i in cut..length {
        let suffix_idx = i - cut;
        slots.push(match suffix_source.elements.get(suffix_idx) {
            Some(e) => BaseSlot::Prefilled(e.clone()),
            None => BaseSlot::Empty,
        });
    }
    Some(slots)
}

/// Fills the head from a corpus sequence, keeping a trailing fresh region.
fn prepend<R: Rng>(corpus: &Corpus, rng: &mut R, length: usize) -> Option<Vec<BaseSlot>> {
    let source = corpus.random_mutable_sequence(rng)?;
    let head_len = source.len().min(length);
    let mut slots = Vec::with_capacity(length);
    for i in 0..head_len {
        slots.push(BaseSlot::Prefilled(source.elements[i].clone()));
    }
    for _ in head_len..length {
        slots.push(BaseSlot::Empty);
    }
    Some(slots)
}

/// Fills the tail from a corpus sequence, keeping a leading fresh region.
fn append<R: Rng>(corpus: &Corpus, rng: &mut R, length: usize) -> Option<Vec<BaseSlot>> {
    let source = corpus.random_mutable_sequence(rng)?;
    let tail_len = source.len().min(length);
    let head_len = length - tail_len;
    let mut slots = Vec::with_capacity(length);
    for _ in 0..head_len {
        slots.push(BaseSlot::Empty);
    }
    for i in 0..tail_len {
        slots.push(BaseSlot::Prefilled(source.elements[i].clone()));
    }
    Some(slots)
}
