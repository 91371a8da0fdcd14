//! # Threshold Proof Generation
//!
//! [`ProofBackend`] is the seam to the prover. It is a blocking, CPU-bound
//! call: the pipeline runs it on a bounded blocking pool, never on an async
//! worker thread.
//!
//! [`Groth16Backend`] is the in-process implementation:
//!
//! 1. **Setup**: `Groth16Backend::setup(rng)` once per circuit shape, or
//!    `Groth16Backend::load(path)` for a ceremony-generated proving key.
//! 2. **Prove**: synthesise the witness, reject unsatisfiable inputs, then
//!    invoke `Groth16::prove`.
//! 3. The resulting [`ProofArtifact`] carries affine coordinates in the
//!    prover's native ordering plus the five public signals.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_groth16::{Groth16, Proof, ProvingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use super::circuit::ThresholdCircuit;
use super::commitment::{join_violations, Commitment, Violation, ViolationKind};
use super::verifier::ThresholdVerifier;
use super::{field_to_u256, u256_to_field};
use crate::config::PUBLIC_SIGNAL_COUNT;
use crate::error::ErrorCode;
use crate::serde_util::u256_dec;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProofError {
    #[error("invalid proof parameters: {}", join_violations(.0))]
    InvalidParameters(Vec<Violation>),

    /// The secrets do not open the supplied commitment. Never retried.
    #[error("commitment does not match the supplied secrets")]
    CommitmentMismatch,

    #[error("malformed proof encoding: {0}")]
    MalformedEncoding(String),

    /// Offered terms are below the hidden thresholds. A negative
    /// authorization result rather than a fault.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Opaque prover failure. Retrying the identical request is safe.
    #[error("prover failure: {0}")]
    ProverFailure(String),
}

impl ProofError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProofError::InvalidParameters(_) | ProofError::MalformedEncoding(_) => {
                ErrorCode::InvalidParameters
            }
            ProofError::CommitmentMismatch => ErrorCode::CommitmentMismatch,
            ProofError::ConstraintViolation(_) => ErrorCode::ConstraintViolation,
            ProofError::ProverFailure(_) => ErrorCode::ProverFailure,
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything the prover needs. `secret_*` are private witnesses, the rest
/// become public signals.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInputs {
    #[serde(with = "u256_dec")]
    pub secret_price: U256,
    #[serde(with = "u256_dec")]
    pub secret_amount: U256,
    pub commitment: Commitment,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    #[serde(with = "u256_dec")]
    pub offered_price: U256,
    #[serde(with = "u256_dec")]
    pub offered_amount: U256,
}

impl fmt::Debug for ProofInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofInputs")
            .field("secret_price", &"<redacted>")
            .field("secret_amount", &"<redacted>")
            .field("commitment", &self.commitment)
            .field("nonce", &"<redacted>")
            .field("offered_price", &self.offered_price)
            .field("offered_amount", &self.offered_amount)
            .finish()
    }
}

impl ProofInputs {
    /// Threshold facts the proof attests to, as violations when they fail.
    pub fn threshold_violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.offered_price < self.secret_price {
            out.push(Violation::new("offeredPrice", ViolationKind::BelowThreshold));
        }
        if self.offered_amount < self.secret_amount {
            out.push(Violation::new("offeredAmount", ViolationKind::BelowThreshold));
        }
        out
    }

    /// Populated circuit, or `InvalidParameters` for values outside Fr.
    pub fn to_circuit(&self) -> Result<ThresholdCircuit, ProofError> {
        let mut violations = Vec::new();
        let mut field = |name: &'static str, value: U256| {
            u256_to_field::<Fr>(value).unwrap_or_else(|| {
                violations.push(Violation::new(name, ViolationKind::AboveMaximum));
                Fr::from(0u64)
            })
        };

        let circuit = ThresholdCircuit::new(
            field("secretPrice", self.secret_price),
            field("secretAmount", self.secret_amount),
            self.commitment.to_field(),
            field("nonce", self.nonce),
            field("offeredPrice", self.offered_price),
            field("offeredAmount", self.offered_amount),
        );

        if violations.is_empty() {
            Ok(circuit)
        } else {
            Err(ProofError::InvalidParameters(violations))
        }
    }
}

// ---------------------------------------------------------------------------
// ProofArtifact
// ---------------------------------------------------------------------------

/// A Groth16 proof as affine coordinates, plus its public signals.
///
/// `pi_b` keeps the native Fq2 ordering `[c0, c1]`; the verifier encoding
/// is responsible for swapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofArtifact {
    pub pi_a: [U256; 2],
    pub pi_b: [[U256; 2]; 2],
    pub pi_c: [U256; 2],
    /// `[valid, commit, nonce, offeredPrice, offeredAmount]`
    pub public_signals: [U256; PUBLIC_SIGNAL_COUNT],
}

impl ProofArtifact {
    pub fn from_ark(proof: &Proof<Bn254>, public_inputs: &[Fr; PUBLIC_SIGNAL_COUNT]) -> Self {
        Self {
            pi_a: [field_to_u256(proof.a.x), field_to_u256(proof.a.y)],
            pi_b: [
                [field_to_u256(proof.b.x.c0), field_to_u256(proof.b.x.c1)],
                [field_to_u256(proof.b.y.c0), field_to_u256(proof.b.y.c1)],
            ],
            pi_c: [field_to_u256(proof.c.x), field_to_u256(proof.c.y)],
            public_signals: public_inputs.map(field_to_u256),
        }
    }

    /// The circuit pins `valid` to one; anything else is a rejection.
    pub fn is_valid(&self) -> bool {
        self.public_signals[0] == U256::one()
    }

    pub fn commitment(&self) -> U256 {
        self.public_signals[1]
    }

    /// Rebuild the arkworks proof, checking every point is on the curve and
    /// in the prime-order subgroup.
    pub fn to_ark_proof(&self) -> Result<Proof<Bn254>, ProofError> {
        let a = g1_point(&self.pi_a)?;
        let c = g1_point(&self.pi_c)?;

        let bx = Fq2::new(fq(self.pi_b[0][0])?, fq(self.pi_b[0][1])?);
        let by = Fq2::new(fq(self.pi_b[1][0])?, fq(self.pi_b[1][1])?);
        let b = G2Affine::new_unchecked(bx, by);
        if !b.is_on_curve() || !b.is_in_correct_subgroup_assuming_on_curve() {
            return Err(ProofError::MalformedEncoding("pi_b is not a valid G2 point".into()));
        }

        Ok(Proof { a, b, c })
    }

    /// Public signals as field elements.
    pub fn public_inputs(&self) -> Result<[Fr; PUBLIC_SIGNAL_COUNT], ProofError> {
        let mut out = [Fr::from(0u64); PUBLIC_SIGNAL_COUNT];
        for (slot, value) in out.iter_mut().zip(self.public_signals.iter()) {
            *slot = u256_to_field::<Fr>(*value).ok_or_else(|| {
                ProofError::InvalidParameters(vec![Violation::new(
                    "publicSignals",
                    ViolationKind::AboveMaximum,
                )])
            })?;
        }
        Ok(out)
    }
}

fn fq(value: U256) -> Result<Fq, ProofError> {
    u256_to_field::<Fq>(value)
        .ok_or_else(|| ProofError::MalformedEncoding("coordinate outside the base field".into()))
}

fn g1_point(coords: &[U256; 2]) -> Result<G1Affine, ProofError> {
    let p = G1Affine::new_unchecked(fq(coords[0])?, fq(coords[1])?);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ProofError::MalformedEncoding("not a valid G1 point".into()));
    }
    Ok(p)
}

// ---------------------------------------------------------------------------
// ProofBackend
// ---------------------------------------------------------------------------

/// The external prover seam. Implementations block the calling thread.
pub trait ProofBackend: Send + Sync + 'static {
    fn prove(&self, inputs: &ProofInputs) -> Result<ProofArtifact, ProofError>;
}

// ---------------------------------------------------------------------------
// Groth16Backend
// ---------------------------------------------------------------------------

/// Holds the Groth16 proving key for [`ThresholdCircuit`].
///
/// Large but immutable; share one instance behind an `Arc`.
pub struct Groth16Backend {
    pk: ProvingKey<Bn254>,
}

impl Groth16Backend {
    /// Run a local circuit-specific setup. Returns both halves.
    pub fn setup<R: Rng + CryptoRng>(rng: &mut R) -> Result<(Self, ThresholdVerifier), ProofError> {
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(ThresholdCircuit::blank(), rng)
            .map_err(|e| ProofError::ProverFailure(format!("groth16 setup failed: {}", e)))?;
        Ok((Self { pk }, ThresholdVerifier::from_vk(vk)))
    }

    pub fn from_proving_key(pk: ProvingKey<Bn254>) -> Self {
        Self { pk }
    }

    /// The verifier matching this proving key.
    pub fn verifier(&self) -> ThresholdVerifier {
        ThresholdVerifier::from_vk(self.pk.vk.clone())
    }

    /// Load a compressed proving key from disk.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read proving key {}", path.display()))?;
        let pk = ProvingKey::<Bn254>::deserialize_compressed(&bytes[..])
            .context("failed to deserialize proving key")?;
        Ok(Self { pk })
    }

    /// Persist the proving key (compressed).
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        self.pk
            .serialize_compressed(&mut bytes)
            .context("proving key serialization failed")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write proving key {}", path.display()))
    }
}

impl ProofBackend for Groth16Backend {
    fn prove(&self, inputs: &ProofInputs) -> Result<ProofArtifact, ProofError> {
        let circuit = inputs.to_circuit()?;
        let public = circuit
            .public_inputs()
            .ok_or_else(|| ProofError::ProverFailure("circuit has no public inputs".into()))?;

        // ark-groth16 debug-asserts satisfiability inside `prove`, so an
        // unsatisfiable witness must be caught here.
        ensure_satisfied(circuit.clone(), inputs)?;

        let started = Instant::now();
        let mut rng = rand::rngs::OsRng;
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, &mut rng)
            .map_err(|e| ProofError::ProverFailure(e.to_string()))?;

        tracing::debug!(
            commitment = %inputs.commitment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "groth16 proof generated"
        );

        Ok(ProofArtifact::from_ark(&proof, &public))
    }
}

fn ensure_satisfied(circuit: ThresholdCircuit, inputs: &ProofInputs) -> Result<(), ProofError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit
        .generate_constraints(cs.clone())
        .map_err(|e| ProofError::ProverFailure(e.to_string()))?;

    let satisfied = cs
        .is_satisfied()
        .map_err(|e| ProofError::ProverFailure(e.to_string()))?;
    if satisfied {
        return Ok(());
    }

    let violations = inputs.threshold_violations();
    if !violations.is_empty() {
        return Err(ProofError::ConstraintViolation(join_violations(&violations)));
    }
    let path = cs.which_is_unsatisfied().ok().flatten().unwrap_or_default();
    Err(ProofError::ConstraintViolation(format!(
        "unsatisfied constraint {}",
        path
    )))
}

// ---------------------------------------------------------------------------
// Shared test fixture
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use std::sync::{Arc, OnceLock};

    /// One setup per test binary; Groth16 key generation dominates runtime.
    pub(crate) fn backend() -> Arc<Groth16Backend> {
        static BACKEND: OnceLock<Arc<Groth16Backend>> = OnceLock::new();
        BACKEND
            .get_or_init(|| {
                let mut rng = StdRng::seed_from_u64(42);
                let (backend, _) = Groth16Backend::setup(&mut rng).unwrap();
                Arc::new(backend)
            })
            .clone()
    }

    pub(crate) fn inputs(offered_price: u64, offered_amount: u64) -> ProofInputs {
        let price = U256::from(3_000_000_000u64);
        let amount = U256::from(3_000_000_000u64);
        let nonce = U256::from(123_456_789u64);
        ProofInputs {
            secret_price: price,
            secret_amount: amount,
            commitment: crate::zkp::commitment::commit(price, amount, nonce).unwrap(),
            nonce,
            offered_price: U256::from(offered_price),
            offered_amount: U256::from(offered_amount),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
