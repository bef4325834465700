mod targets;

use clap::Parser;
use crucible::abi::ContractDefinition;
use crucible::chain::mock::MockChain;
use crucible::chain::{CoverageDelta, ExecutionResult, MessageResults};
use crucible::config::FuzzerConfig;
use crucible::fuzzer::Fuzzer;
use crucible::logger;
use crucible::oracle::TestCaseStatus;
use crucible::sequence::CallMessage;
use std::time::Duration;
use targets::load_contracts;
use tracing::info;

/// Coverage-guided call-sequence fuzzer for EVM-like smart contracts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CrucibleArgs {
    /// Path to a JSON file describing the target contracts (see
    /// `targets::load_contracts` for the expected shape).
    #[arg(short, long)]
    target: String,

    /// Number of parallel worker threads.
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Number of calls synthesized per sequence.
    #[arg(short, long, default_value_t = 100)]
    sequence_length: usize,

    /// Maximum number of shrink iterations attempted per failing sequence.
    #[arg(long, default_value_t = 5_000)]
    shrink_limit: u32,

    /// How long to run the campaign before stopping, in seconds.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Also exercise `view`/`pure` methods as generation targets.
    #[arg(long, default_value_t = false)]
    test_view_methods: bool,
}

/// Execution backend stand-in: this crate ships no real EVM interpreter, so
/// the CLI drives campaigns against an oracle-backed `MockChain` that always
/// succeeds. Wiring in a real `Chain` implementation only requires
/// supplying a different `chain_factory` to `Fuzzer::start`.
fn always_succeeds_chain(_worker_id: usize) -> MockChain {
    MockChain::new(Box::new(|_msg: &CallMessage, _block_number: u64, _block_timestamp: u64| MessageResults {
        execution_result: ExecutionResult::success(vec![], 21_000),
        coverage_delta: CoverageDelta::default(),
    }))
}

fn run(args: CrucibleArgs) -> anyhow::Result<()> {
    let contracts: Vec<ContractDefinition> = load_contracts(&args.target)?;
    info!(count = contracts.len(), "loaded target contracts");

    let config = FuzzerConfig {
        worker_count: args.workers,
        sequence_length: args.sequence_length,
        shrink_limit: args.shrink_limit,
        test_view_methods: args.test_view_methods,
        ..FuzzerConfig::default()
    };

    let dashboard_contracts = contracts.clone();
    let fuzzer = Fuzzer::start(config, contracts, always_succeeds_chain);

    let deadline = std::time::Instant::now() + Duration::from_secs(args.duration_secs);
    while std::time::Instant::now() < deadline && !fuzzer.is_stopped() {
        print_dashboard(&fuzzer, &dashboard_contracts);
        std::thread::sleep(Duration::from_millis(500));
    }

    fuzzer.stop();
    print_dashboard(&fuzzer, &dashboard_contracts);
    let fatal = fuzzer.fuzzer_err();
    fuzzer.join();
    if let Some(err) = fatal {
        anyhow::bail!("{err}");
    }
    Ok(())
}

/// Refreshes a single status line per worker plus the aggregate corpus and
/// reversion counters, at roughly the 2 Hz cadence the worker-activity
/// model is designed for.
fn print_dashboard(fuzzer: &Fuzzer, contracts: &[ContractDefinition]) {
    if let Some(err) = fuzzer.fuzzer_err() {
        println!("campaign aborted: {err}");
        return;
    }
    for (id, snapshot) in fuzzer.workers().iter().enumerate() {
        println!("worker {id}: {}", snapshot.description());
    }
    let totals = fuzzer.reversion_totals();
    println!(
        "corpus: {} sequences, {} branches hit | calls: {} total, {} reverted ({:.1}%)",
        fuzzer.corpus().active_mutable_sequence_count(),
        fuzzer.corpus().coverage_maps().branches_hit(),
        totals.total_calls_all(),
        totals.reverted_calls_all(),
        totals.revert_rate() * 100.0,
    );
    if totals.reverted_calls_all() > 0 {
        println!("{}", totals.render(contracts));
    }
    let failing = fuzzer.test_cases_with_status(TestCaseStatus::Failed);
    if !failing.is_empty() {
        println!("failing test cases: {}", failing.iter().map(|t| t.method.name.clone()).collect::<Vec<_>>().join(", "));
    }
}

fn main() {
    logger::init();
    let args = CrucibleArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
