//! Per-worker atomic counters (§4.7): calls executed, sequences completed,
//! and gas spent. Shared only for reading by the dashboard; each worker
//! owns and writes its own.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct WorkerMetrics {
    calls: AtomicU64,
    sequences: AtomicU64,
    gas: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, gas_used: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.gas.fetch_add(gas_used, Ordering::Relaxed);
    }

    pub fn record_sequence(&self) {
        self.sequences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn sequences(&self) -> u64 {
        self.sequences.load(Ordering::Relaxed)
    }

    pub fn gas(&self) -> u64 {
        self.gas.load(Ordering::Relaxed)
    }
}
