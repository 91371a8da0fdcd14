//! Terminal walkthrough of a hidden-threshold order.
//!
//! A maker commits to secret thresholds, publishes the order and registers
//! the opening; a taker then asks for one fill below and one above the
//! hidden price. The output uses ANSI escape codes for colored rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::Instant;

use ethers_core::types::{Address, U256};
use rand::rngs::StdRng;
use rand::SeedableRng;

use umbra_protocol::authorization::{AuthorizationService, OrderRegistry};
use umbra_protocol::catalog::{OrderCatalog, OrderFilter, PublishRequest};
use umbra_protocol::config::ServiceConfig;
use umbra_protocol::logging;
use umbra_protocol::order::salt::unpack;
use umbra_protocol::order::{order_hash, LocalOrderSigner, OrderDomain, OrderParameters, OrderSigner};
use umbra_protocol::zkp::commitment::{self, SecretParameters};
use umbra_protocol::zkp::{Groth16Backend, ProofPipeline};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// Anvil account #0. Never use outside a local chain.
const MAKER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(title: &str) {
    println!();
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!("{DIM}  {}{RESET}", "-".repeat(64));
}

fn step(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn ok(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn denied(text: &str) {
    println!("{RED}  [DENIED] {text}{RESET}");
}

fn kv(label: &str, value: impl std::fmt::Display) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, started: Instant) {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::default();
    logging::init_from_config(&config);

    section("1. Trusted setup");
    step("Running circuit-specific Groth16 setup (seeded, demo only)");
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(42);
    let (backend, verifier) = Groth16Backend::setup(&mut rng)?;
    timing("setup", started);

    let maker = Arc::new(LocalOrderSigner::from_private_key(MAKER_KEY)?);
    let domain = OrderDomain::new(8453, config.router_address);
    let service = AuthorizationService::new(
        Arc::new(OrderRegistry::new()),
        ProofPipeline::new(Arc::new(backend), config.prover_workers),
        maker.clone(),
        domain.clone(),
        Address::repeat_byte(0x44),
    );

    section("2. Maker commits to hidden thresholds");
    let secrets = SecretParameters {
        secret_price: U256::from(3_000_000_000u64),
        secret_amount: U256::from(3_000_000_000u64),
        nonce: commitment::generate_nonce(),
        maker_identity: maker.address(),
    };
    let c = commitment::commit_params(&secrets)?;
    kv("maker", format!("{:#x}", maker.address()));
    kv("commitment", c);
    ok("Thresholds hidden behind Poseidon(price, amount, nonce)");

    section("3. Publish and register");
    let params = OrderParameters::new(
        maker.address(),
        Address::repeat_byte(0x22),
        Address::repeat_byte(0x33),
        U256::from(1_000_000_000_000_000_000u64),
        U256::from(3_000_000_000u64),
        c,
    );
    let initial = params.initial_order();
    let hash = order_hash(&initial, &domain);
    let signature = maker.sign_order(&initial, &domain).await?;

    let dir = tempfile::tempdir()?;
    let catalog = OrderCatalog::open(dir.path().join("published-orders.json"));
    let published = catalog.publish(PublishRequest {
        order_data: serde_json::to_value(&initial)?,
        signature: signature.to_hex(),
        commitment: c,
        maker: initial.maker,
        maker_asset: initial.maker_asset,
        taker_asset: initial.taker_asset,
        making_amount: initial.making_amount,
        taking_amount: initial.taking_amount,
        original_salt: None,
        network: config.network.clone(),
    })?;
    service.register_order(c, params, secrets, Some(hash))?;
    kv("catalog id", &published.id);
    kv("order hash", format!("{:#x}", hash));
    kv("active orders", catalog.query(&OrderFilter::active())?.len());

    section("4. Taker offers 2,500 USDC");
    match service.authorize_fill(hash, U256::from(2_500_000_000u64)).await {
        Ok(_) => println!("{RED}  unexpected authorization{RESET}"),
        Err(e) => denied(&format!("{} ({})", e.public_reason(), e.code())),
    }

    section("5. Taker offers 3,200 USDC");
    let started = Instant::now();
    let auth = service.authorize_fill(hash, U256::from(3_200_000_000u64)).await?;
    timing("authorize_fill", started);

    let parts = unpack(auth.order.salt);
    kv("rebuilt salt", auth.order.salt);
    kv("salt commitment tag", format!("{:#x}", parts.commitment));
    kv("extension bytes", auth.extension.len());
    kv("signature", &auth.signature);
    ok("Fill authorized and re-signed");

    let gate = umbra_protocol::order::Extension::decode(&auth.extension)?.zk_predicate()?;
    ok(&format!(
        "Local verifier accepts the embedded proof: {}",
        verifier.verify_encoded(&gate.proof)?
    ));

    println!();
    Ok(())
}
