//! Reversion accounting (§4.6): per-sequence revert reports, keyed by 4-byte
//! function/error selector, merged associatively into running campaign
//! totals by a background aggregator that drains a bounded channel. The
//! channel applies backpressure: a worker submitting into a full channel
//! blocks until the aggregator catches up, rather than losing the report.
use crate::abi::ContractDefinition;
use crate::chain::ExecutionError;
use crate::sequence::CallSequence;
use crate::types::{Selector, PANIC_SELECTOR, SUCCESS_SELECTOR};
use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Solidity's built-in `Panic(uint256)` codes (§4.6), decoded into a short
/// human reason. Anything outside this table decodes as `"panic: 0x{code:x}"`.
fn panic_reason(code: u8) -> String {
    let name = match code {
        0x00 => "generic compiler panic",
        0x01 => "assert(false)",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum conversion",
        0x22 => "invalid encoded storage byte array access",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to a zero-initialized variable of internal function type",
        _ => return format!("panic: 0x{code:02x}"),
    };
    name.to_string()
}

/// Extracts a human-readable revert reason from raw EVM return data: the
/// standard `Error(string)` encoding, a `Panic(uint256)` encoding, or a
/// fallback describing the raw bytes. Used by the shrinker's oracle-identity
/// check (§4.4), which compares reasons as strings rather than selectors.
pub fn decode_revert_reason(return_data: &[u8]) -> String {
    if return_data.len() >= 4 && return_data[0..4] == PANIC_SELECTOR {
        let word = &return_data[4..];
        let tail = if word.len() >= 8 { &word[word.len() - 8..] } else { word };
        let code = tail.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        return panic_reason(code as u8);
    }
    // Error(string) selector: 0x08c379a0, followed by an ABI-encoded string.
    const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
    if return_data.len() >= 4 && return_data[0..4] == ERROR_STRING_SELECTOR {
        if let Ok(tokens) = ethers::abi::decode(&[ethers::abi::ParamType::String], &return_data[4..]) {
            if let Some(ethers::abi::Token::String(s)) = tokens.into_iter().next() {
                return s;
            }
        }
    }
    if return_data.is_empty() {
        "reverted with no data".to_string()
    } else {
        format!("reverted with {} bytes of unrecognized data", return_data.len())
    }
}

/// Reduces raw return data from a reverted call to the error selector
/// recorded against it (§3, §4.6, §8): the first four bytes, with the
/// compiler panic selector "smuggled" into `{0x00, 0x00, 0x00, code}` so the
/// aggregator can group all panics (and distinguish panic codes) without a
/// separate histogram dimension.
fn observed_error_selector(return_data: &[u8]) -> Option<Selector> {
    if return_data.len() < 4 {
        return None;
    }
    let raw: Selector = [return_data[0], return_data[1], return_data[2], return_data[3]];
    if raw == PANIC_SELECTOR && return_data.len() >= 36 {
        Some([0x00, 0x00, 0x00, return_data[35]])
    } else {
        Some(raw)
    }
}

/// Per-sequence revert counters (§3, §4.6): three mappings keyed by 4-byte
/// function selector. `reverted_call_reasons` is keyed a second time by
/// error selector, with [`SUCCESS_SELECTOR`] (all-zero) standing in for a
/// non-reverting call.
#[derive(Debug, Clone, Default)]
pub struct SequenceRevertReport {
    pub total_calls: HashMap<Selector, u64>,
    pub reverted_calls: HashMap<Selector, u64>,
    pub reverted_call_reasons: HashMap<Selector, HashMap<Selector, u64>>,
}

impl SequenceRevertReport {
    /// Builds a report from one executed sequence (§4.6 "Per-call
    /// accounting"):
    /// - elements with no result, or whose error is neither `revert` nor
    ///   success (out-of-gas, etc.), are ignored entirely;
    /// - calls with fewer than 4 bytes of data are skipped (no selector to
    ///   key on);
    /// - a revert is counted under its (possibly panic-smuggled) error
    ///   selector; a success is counted under [`SUCCESS_SELECTOR`].
    pub fn from_sequence(seq: &CallSequence) -> Self {
        let mut report = SequenceRevertReport::default();
        for element in &seq.elements {
            let Some(results) = &element.results else { continue };
            let reverted = match &results.execution_result.err {
                None => false,
                Some(ExecutionError::Revert) => true,
                Some(_) => continue,
            };
            if element.call.data.len() < 4 {
                continue;
            }
            let func_sel: Selector = [element.call.data[0], element.call.data[1], element.call.data[2], element.call.data[3]];

            *report.total_calls.entry(func_sel).or_insert(0) += 1;
            if reverted {
                *report.reverted_calls.entry(func_sel).or_insert(0) += 1;
                if let Some(error_sel) = observed_error_selector(&results.execution_result.return_data) {
                    *report.reverted_call_reasons.entry(func_sel).or_default().entry(error_sel).or_insert(0) += 1;
                }
            } else {
                *report.reverted_call_reasons.entry(func_sel).or_default().entry(SUCCESS_SELECTOR).or_insert(0) += 1;
            }
        }
        report
    }

    /// Associative, commutative merge (§4.6 `concatReports`, §8 "Reversion-
    /// stats associativity"): every level sums.
    pub fn merge(mut self, other: SequenceRevertReport) -> Self {
        for (sel, count) in other.total_calls {
            *self.total_calls.entry(sel).or_insert(0) += count;
        }
        for (sel, count) in other.reverted_calls {
            *self.reverted_calls.entry(sel).or_insert(0) += count;
        }
        for (func_sel, reasons) in other.reverted_call_reasons {
            let entry = self.reverted_call_reasons.entry(func_sel).or_default();
            for (error_sel, count) in reasons {
                *entry.entry(error_sel).or_insert(0) += count;
            }
        }
        self
    }

    pub fn total_calls_all(&self) -> u64 {
        self.total_calls.values().sum()
    }

    pub fn reverted_calls_all(&self) -> u64 {
        self.reverted_calls.values().sum()
    }

    pub fn revert_rate(&self) -> f64 {
        let total = self.total_calls_all();
        if total == 0 {
            0.0
        } else {
            self.reverted_calls_all() as f64 / total as f64
        }
    }

    /// Names an error selector for display (§4.6): `{0,0,0,code}` decodes
    /// through the Solidity panic table, the all-zero selector reads as
    /// "success", and anything else is resolved against a contract's known
    /// method/error selectors at print time, falling back to raw hex.
    fn name_error_selector(selector: Selector, contracts: &[ContractDefinition]) -> String {
        if selector == SUCCESS_SELECTOR {
            return "success".to_string();
        }
        if selector[0] == 0 && selector[1] == 0 && selector[2] == 0 {
            return panic_reason(selector[3]);
        }
        for contract in contracts {
            for method in &contract.methods {
                if method.selector == selector {
                    return method.name.clone();
                }
            }
        }
        format!("0x{}", hex::encode(selector))
    }

    fn name_function_selector(selector: Selector, contracts: &[ContractDefinition]) -> String {
        for contract in contracts {
            for method in &contract.methods {
                if method.selector == selector {
                    return method.name.clone();
                }
            }
        }
        format!("0x{}", hex::encode(selector))
    }

    /// Renders per-selector totals and percentage breakdowns (§4.6), naming
    /// functions/errors from `contracts`' ABI tables where possible.
    pub fn render(&self, contracts: &[ContractDefinition]) -> String {
        let mut lines = Vec::new();
        let mut selectors: Vec<&Selector> = self.total_calls.keys().collect();
        selectors.sort();
        for selector in selectors {
            let total = *self.total_calls.get(selector).unwrap_or(&0);
            let reverted = self.reverted_calls.get(selector).copied().unwrap_or(0);
            let pct = if total == 0 { 0.0 } else { reverted as f64 / total as f64 * 100.0 };
            lines.push(format!(
                "{}: {total} calls, {reverted} reverted ({pct:.1}%)",
                Self::name_function_selector(*selector, contracts)
            ));
            if let Some(reasons) = self.reverted_call_reasons.get(selector) {
                let mut reason_sels: Vec<&Selector> = reasons.keys().collect();
                reason_sels.sort();
                for reason_sel in reason_sels {
                    let count = reasons[reason_sel];
                    lines.push(format!("    {}: {count}", Self::name_error_selector(*reason_sel, contracts)));
                }
            }
        }
        lines.join("\n")
    }
}

/// A background-aggregated running total of reversion statistics across the
/// whole campaign. Workers submit one [`SequenceRevertReport`] per completed
/// sequence over a bounded channel — submission blocks while the channel is
/// full, so a slow aggregator throttles workers rather than losing data —
/// and a single aggregator thread merges them into `totals`.
pub struct ReversionStatistics {
    sender: SyncSender<SequenceRevertReport>,
    totals: Arc<Mutex<SequenceRevertReport>>,
    // Wrapped in a `Mutex` purely so `ReversionStatistics` as a whole stays
    // `Sync` — `JoinHandle` is `Send` but not `Sync`, and this type is
    // shared across worker threads behind an `Arc`.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReversionStatistics {
    pub fn start(channel_capacity: usize) -> Self {
        let (sender, receiver): (SyncSender<SequenceRevertReport>, Receiver<SequenceRevertReport>) = sync_channel(channel_capacity);
        let totals = Arc::new(Mutex::new(SequenceRevertReport::default()));
        let totals_for_thread = totals.clone();
        let handle = std::thread::spawn(move || {
            while let Ok(report) = receiver.recv() {
                let mut guard = totals_for_thread.lock().unwrap();
                let merged = std::mem::take(&mut *guard).merge(report);
                *guard = merged;
            }
        });
        Self { sender, totals, handle: Mutex::new(Some(handle)) }
    }

    /// Submits a report. Blocks the calling worker if the aggregator has
    /// fallen behind and the channel is full — backpressure is intentional
    /// here, not a bug: dropping reports would silently corrupt the totals.
    pub fn submit(&self, report: SequenceRevertReport) {
        let _ = self.sender.send(report);
    }

    pub fn snapshot(&self) -> SequenceRevertReport {
        self.totals.lock().unwrap().clone()
    }

    /// Closes the submission channel and waits for the aggregator to drain
    /// and exit.
    pub fn shutdown(mut self) {
        drop(self.sender_owned());
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn sender_owned(&mut self) -> SyncSender<SequenceRevertReport> {
        // Swap in a sender whose only remaining clone we immediately drop,
        // so the aggregator's `recv()` observes disconnection.
        let (replacement, _unused_receiver) = sync_channel(1);
        std::mem::replace(&mut self.sender, replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{CoverageDelta, ExecutionResult, MessageResults};
    use crate::sequence::{CallMessage, CallSequenceElement};
    use ethers::types::{H160, U256};

    fn message_with_data(data: Vec<u8>) -> CallMessage {
        CallMessage {
            sender: H160::zero(),
            recipient: None,
            nonce: 0,
            value: U256::zero(),
            gas_limit: 1,
            gas_price: U256::zero(),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            data,
            data_abi: None,
        }
    }

    fn func_sel() -> Selector {
        [0xde, 0xad, 0xbe, 0xef]
    }

    fn other_func_sel() -> Selector {
        [0x01, 0x02, 0x03, 0x04]
    }

    fn panic_data(code: u8) -> Vec<u8> {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend([0u8; 31]);
        data.push(code);
        data
    }

    fn user_error_data() -> Vec<u8> {
        vec![0xaa, 0xbb, 0xcc, 0xdd]
    }

    #[test]
    fn panic_selector_decodes_known_code() {
        assert_eq!(decode_revert_reason(&panic_data(0x11)), "arithmetic overflow or underflow");
    }

    #[test]
    fn unknown_panic_code_falls_back_to_hex() {
        assert_eq!(decode_revert_reason(&panic_data(0x99)), "panic: 0x99");
    }

    #[test]
    fn panic_smuggling_rewrites_selector_to_zero_prefixed_code() {
        let data = panic_data(0x11);
        assert_eq!(observed_error_selector(&data), Some([0x00, 0x00, 0x00, 0x11]));
    }

    #[test]
    fn short_data_is_skipped() {
        let mut data = func_sel().to_vec();
        data.truncate(3);
        let mut element = CallSequenceElement::new(message_with_data(data), 0, 0, None);
        element.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });
        let seq = CallSequence::new(vec![element]);
        let report = SequenceRevertReport::from_sequence(&seq);
        assert!(report.total_calls.is_empty());
    }

    /// Scenario from the spec's §8: three calls `(f, panic 0x11)`,
    /// `(f, success)`, `(g, user error)` roll up to
    /// `total_calls[f]=2, reverted_calls[f]=1,
    /// reverted_call_reasons[f][{0,0,0,0x11}]=1, total_calls[g]=1`.
    #[test]
    fn scenario_from_spec_rolls_up_per_function_selector() {
        let mut f_panic = CallSequenceElement::new(message_with_data(func_sel().to_vec()), 0, 0, None);
        f_panic.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(panic_data(0x11), 30_000),
            coverage_delta: CoverageDelta::default(),
        });

        let mut f_success = CallSequenceElement::new(message_with_data(func_sel().to_vec()), 0, 0, None);
        f_success.results = Some(MessageResults {
            execution_result: ExecutionResult::success(vec![], 21_000),
            coverage_delta: CoverageDelta::default(),
        });

        let mut g_error = CallSequenceElement::new(message_with_data(other_func_sel().to_vec()), 0, 0, None);
        g_error.results = Some(MessageResults {
            execution_result: ExecutionResult::reverted(user_error_data(), 25_000),
            coverage_delta: CoverageDelta::default(),
        });

        let seq = CallSequence::new(vec![f_panic, f_success, g_error]);
        let report = SequenceRevertReport::from_sequence(&seq);

        assert_eq!(report.total_calls.get(&func_sel()), Some(&2));
        assert_eq!(report.reverted_calls.get(&func_sel()), Some(&1));
        assert_eq!(
            report.reverted_call_reasons.get(&func_sel()).and_then(|m| m.get(&[0x00, 0x00, 0x00, 0x11])),
            Some(&1)
        );
        assert_eq!(report.total_calls.get(&other_func_sel()), Some(&1));
        assert_eq!(
            report.reverted_call_reasons.get(&other_func_sel()).and_then(|m| m.get(&[0xaa, 0xbb, 0xcc, 0xdd])),
            Some(&1)
        );
    }

    #[test]
    fn merge_is_associative_across_selectors() {
        let mut a = SequenceRevertReport::default();
        a.total_calls.insert(func_sel(), 3);
        a.reverted_calls.insert(func_sel(), 1);
        a.reverted_call_reasons.entry(func_sel()).or_default().insert([0, 0, 0, 1], 1);

        let mut b = SequenceRevertReport::default();
        b.total_calls.insert(func_sel(), 2);
        b.reverted_calls.insert(func_sel(), 2);
        b.reverted_call_reasons.entry(func_sel()).or_default().insert([0, 0, 0, 1], 1);
        b.reverted_call_reasons.entry(func_sel()).or_default().insert([0, 0, 0, 2], 1);

        let mut c = SequenceRevertReport::default();
        c.total_calls.insert(other_func_sel(), 1);

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));

        assert_eq!(left.total_calls_all(), right.total_calls_all());
        assert_eq!(left.reverted_calls_all(), right.reverted_calls_all());
        assert_eq!(
            left.reverted_call_reasons.get(&func_sel()).and_then(|m| m.get(&[0, 0, 0, 1])),
            right.reverted_call_reasons.get(&func_sel()).and_then(|m| m.get(&[0, 0, 0, 1]))
        );
    }

    #[test]
    fn aggregator_accumulates_submitted_reports() {
        let stats = ReversionStatistics::start(8);
        let mut report = SequenceRevertReport::default();
        report.total_calls.insert(func_sel(), 1);
        stats.submit(report);
        // Give the background thread a moment to drain; a real caller would
        // poll `snapshot()` or rely on eventual consistency.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(stats.snapshot().total_calls_all(), 1);
        stats.shutdown();
    }
}
