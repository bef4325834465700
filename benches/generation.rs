use criterion::{criterion_group, criterion_main, Criterion};
use crucible::abi::{AbiMethod, ContractDefinition, Mutability};
use crucible::activity::WorkerActivity;
use crucible::config::FuzzerConfig;
use crucible::corpus::Corpus;
use crucible::generator::CallSequenceGenerator;
use crucible::types::Address;
use crucible::value::RandomValues;
use ethers::abi::ParamType;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn target_contract() -> ContractDefinition {
    ContractDefinition {
        address: Address::from_low_u64_be(1),
        methods: vec![
            AbiMethod::new("deposit", vec![ParamType::Uint(256)], vec![], Mutability::NonPayable),
            AbiMethod::new("withdraw", vec![ParamType::Uint(256), ParamType::Address], vec![ParamType::Bool], Mutability::NonPayable),
        ],
    }
}

fn bench_new_sequence(c: &mut Criterion) {
    let contracts = vec![target_contract()];
    let corpus = Corpus::new();
    let config = FuzzerConfig { sequence_length: 50, ..FuzzerConfig::default() };
    let generator = CallSequenceGenerator::new(&config);
    let activity = WorkerActivity::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut values = RandomValues::new(StdRng::seed_from_u64(43));

    c.bench_function("generate_50_element_sequence", |b| {
        b.iter(|| generator.new_sequence(&contracts, &corpus, &config, &mut rng, &mut values, &activity).unwrap())
    });
}

criterion_group!(benches, bench_new_sequence);
criterion_main!(benches);
