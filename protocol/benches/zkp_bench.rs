// Proof pipeline benchmarks.
//
// Covers the Poseidon commitment, Groth16 setup / prove / verify for the
// threshold circuit over BN254, and the verifier ABI encoding.

use criterion::{criterion_group, criterion_main, Criterion};

use ethers_core::types::U256;
use rand::rngs::StdRng;
use rand::SeedableRng;

use umbra_protocol::zkp::commitment;
use umbra_protocol::zkp::{encode_for_verifier, Groth16Backend, ProofBackend, ProofInputs};

const PRICE: u64 = 3_000_000_000;
const NONCE: u64 = 123_456_789;

fn inputs(offered: u64) -> ProofInputs {
    let c = commitment::commit(U256::from(PRICE), U256::from(PRICE), U256::from(NONCE)).unwrap();
    ProofInputs {
        secret_price: U256::from(PRICE),
        secret_amount: U256::from(PRICE),
        commitment: c,
        nonce: U256::from(NONCE),
        offered_price: U256::from(offered),
        offered_amount: U256::from(offered),
    }
}

fn bench_poseidon_commit(c: &mut Criterion) {
    c.bench_function("zkp/poseidon_commit", |b| {
        b.iter(|| commitment::commit(U256::from(PRICE), U256::from(PRICE), U256::from(NONCE)).unwrap());
    });
}

fn bench_groth16_setup(c: &mut Criterion) {
    c.bench_function("zkp/groth16_setup", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            Groth16Backend::setup(&mut rng).unwrap()
        });
    });
}

fn bench_groth16_prove(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let (backend, _verifier) = Groth16Backend::setup(&mut rng).unwrap();
    let inputs = inputs(3_200_000_000);

    c.bench_function("zkp/groth16_prove", |b| {
        b.iter(|| backend.prove(&inputs).unwrap());
    });
}

fn bench_groth16_verify(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let (backend, verifier) = Groth16Backend::setup(&mut rng).unwrap();
    let artifact = backend.prove(&inputs(3_200_000_000)).unwrap();

    c.bench_function("zkp/groth16_verify", |b| {
        b.iter(|| verifier.verify(&artifact).unwrap());
    });
}

fn bench_encode_for_verifier(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let (backend, _verifier) = Groth16Backend::setup(&mut rng).unwrap();
    let artifact = backend.prove(&inputs(3_200_000_000)).unwrap();

    c.bench_function("zkp/encode_for_verifier", |b| {
        b.iter(|| encode_for_verifier(&artifact).unwrap());
    });
}

criterion_group!(
    benches,
    bench_poseidon_commit,
    bench_groth16_setup,
    bench_groth16_prove,
    bench_groth16_verify,
    bench_encode_for_verifier,
);
criterion_main!(benches);
