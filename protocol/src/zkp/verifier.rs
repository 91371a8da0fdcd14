//! # Groth16 Proof Verification
//!
//! Authorization decisions are made on-chain. This local verifier exists so
//! the service (and its tests) can confirm an artifact, or its encoded form,
//! is exactly what the on-chain verifier will accept.
//!
//! Groth16 verification is three pairings plus a small multi-scalar
//! multiplication, constant time in the circuit size.

use anyhow::Context;
use ark_bn254::Bn254;
use ark_groth16::{Groth16, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;

use super::encoding;
use super::prover::{ProofArtifact, ProofError};

/// Groth16 verification key for the threshold circuit.
#[derive(Clone)]
pub struct ThresholdVerifier {
    vk: VerifyingKey<Bn254>,
}

impl ThresholdVerifier {
    pub(crate) fn from_vk(vk: VerifyingKey<Bn254>) -> Self {
        Self { vk }
    }

    /// `Ok(false)` for a well-formed proof that does not verify; `Err` when
    /// the artifact cannot be interpreted at all.
    pub fn verify(&self, artifact: &ProofArtifact) -> Result<bool, ProofError> {
        let proof = artifact.to_ark_proof()?;
        let public_inputs = artifact.public_inputs()?;

        Groth16::<Bn254>::verify(&self.vk, &public_inputs, &proof)
            .map_err(|e| ProofError::ProverFailure(format!("groth16 verification failed: {}", e)))
    }

    /// Decode verifier-ABI bytes (undoing the G2 swap) and verify.
    pub fn verify_encoded(&self, bytes: &[u8]) -> Result<bool, ProofError> {
        let artifact = encoding::decode(bytes)?;
        self.verify(&artifact)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.vk
            .serialize_compressed(&mut buf)
            .context("verification key serialization failed")?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(data)
            .context("failed to deserialize verification key")?;
        Ok(Self { vk })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
