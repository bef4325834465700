//! Top-level campaign orchestration (§4.7): owns the shared corpus, spawns
//! one OS thread per configured worker, and exposes the read-only views the
//! CLI/dashboard poll at ~2 Hz. Workers share nothing but `Arc`-held state;
//! shutdown is a single cooperative `AtomicBool` flag rather than a signal
//! or cancellation token.
use crate::abi::ContractDefinition;
use crate::activity::WorkerActivity;
use crate::chain::{Chain, ChainFatalError};
use crate::config::FuzzerConfig;
use crate::corpus::Corpus;
use crate::metrics::WorkerMetrics;
use crate::oracle::{ContractScanProvider, TestCase, TestCaseProvider, TestCaseStatus};
use crate::reversion::{ReversionStatistics, SequenceRevertReport};
use crate::value::RandomValues;
use crate::worker::FuzzerWorker;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A running (or finished) fuzzing campaign.
pub struct Fuzzer {
    corpus: Arc<Corpus>,
    activities: Vec<Arc<WorkerActivity>>,
    metrics: Vec<Arc<WorkerMetrics>>,
    reversion: Arc<ReversionStatistics>,
    test_cases: Arc<Mutex<Vec<TestCase>>>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    /// Set once by whichever worker first observes a `ChainFatalError`
    /// (§7's "fuzzer error channel" — single-producer-set-once semantics).
    fatal_error: Arc<Mutex<Option<ChainFatalError>>>,
}

impl Fuzzer {
    /// Spawns `config.worker_count` workers, each built from its own `Chain`
    /// via `chain_factory(worker_id)`. Chains are never shared across
    /// threads — only the corpus, activity snapshots, metrics, and revert
    /// statistics are.
    pub fn start<C, F>(config: FuzzerConfig, contracts: Vec<ContractDefinition>, chain_factory: F) -> Self
    where
        C: Chain + Send + 'static,
        F: Fn(usize) -> C + Send + Sync + 'static,
    {
        let corpus = Arc::new(Corpus::new());
        let reversion = Arc::new(ReversionStatistics::start(1024));
        let stop = Arc::new(AtomicBool::new(false));
        let fatal_error: Arc<Mutex<Option<ChainFatalError>>> = Arc::new(Mutex::new(None));
        let chain_factory = Arc::new(chain_factory);

        let provider = ContractScanProvider { contracts: &contracts };
        let test_cases_shared = Arc::new(Mutex::new(provider.discover(&config)));

        let mut activities = Vec::with_capacity(config.worker_count);
        let mut metrics = Vec::with_capacity(config.worker_count);
        let mut handles = Vec::with_capacity(config.worker_count);

        for worker_id in 0..config.worker_count {
            let worker_activity = Arc::new(WorkerActivity::new());
            let worker_metrics = Arc::new(WorkerMetrics::new());
            activities.push(worker_activity.clone());
            metrics.push(worker_metrics.clone());

            let corpus = corpus.clone();
            let config = config.clone();
            let contracts = contracts.clone();
            let reversion = reversion.clone();
            let stop = stop.clone();
            let chain_factory = chain_factory.clone();
            let test_cases = test_cases_shared.clone();
            let fatal_error = fatal_error.clone();

            let handle = std::thread::spawn(move || {
                let chain = chain_factory(worker_id);
                let mut worker = FuzzerWorker::with_fatal_error_slot(
                    worker_id,
                    chain,
                    contracts,
                    corpus,
                    config,
                    worker_activity,
                    worker_metrics,
                    reversion,
                    test_cases,
                    fatal_error,
                );
                let mut rng = StdRng::from_entropy();
                let mut values = RandomValues::new(StdRng::from_entropy());
                worker.run(&stop, &mut rng, &mut values);
            });
            handles.push(handle);
        }

        Self { corpus, activities, metrics, reversion, test_cases: test_cases_shared, stop, handles, fatal_error }
    }

    /// Per-worker activity snapshots, in worker-id order (§4.5, for the
    /// dashboard).
    pub fn workers(&self) -> Vec<crate::activity::ActivitySnapshot> {
        self.activities.iter().map(|a| a.snapshot()).collect()
    }

    /// Per-worker call/sequence/gas counters, in worker-id order.
    pub fn metrics(&self) -> &[Arc<WorkerMetrics>] {
        &self.metrics
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn reversion_totals(&self) -> SequenceRevertReport {
        self.reversion.snapshot()
    }

    pub fn test_cases_with_status(&self, status: TestCaseStatus) -> Vec<TestCase> {
        self.test_cases.lock().iter().filter(|t| t.status == status).cloned().collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// The campaign's fatal error, if a worker's `Chain` ever failed (§7).
    /// Once set, it is never cleared; `is_stopped()` will also be `true`.
    pub fn fuzzer_err(&self) -> Option<String> {
        self.fatal_error.lock().as_ref().map(ToString::to_string)
    }

    /// Flips the shared stop flag; workers finish their in-flight sequence
    /// and exit. Call `join` afterward to wait for them.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Waits for every worker thread to exit. `stop()` should be called
    /// first, or this blocks until the campaign would otherwise run
    /// forever.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiMethod, Mutability};
    use crate::chain::mock::MockChain;
    use crate::chain::{CoverageDelta, ExecutionResult, MessageResults};
    use crate::sequence::CallMessage;
    use ethers::abi::ParamType;
    use std::time::Duration;

    fn contract() -> ContractDefinition {
        ContractDefinition {
            address: crate::types::Address::from_low_u64_be(1),
            methods: vec![AbiMethod::new("setValue", vec![ParamType::Uint(256)], vec![], Mutability::NonPayable)],
        }
    }

    #[test]
    fn campaign_runs_and_stops_cleanly() {
        let config = FuzzerConfig { worker_count: 2, sequence_length: 2, ..FuzzerConfig::default() };
        let fuzzer = Fuzzer::start(config, vec![contract()], |_id| {
            MockChain::new(Box::new(|_msg: &CallMessage, _bn: u64, _ts: u64| MessageResults {
                execution_result: ExecutionResult::success(vec![], 21_000),
                coverage_delta: CoverageDelta::default(),
            }))
        });
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fuzzer.workers().len(), 2);
        assert_eq!(fuzzer.metrics().len(), 2);
        assert!(!fuzzer.is_stopped());
        fuzzer.stop();
        assert!(fuzzer.is_stopped());
        fuzzer.join();
    }
}
