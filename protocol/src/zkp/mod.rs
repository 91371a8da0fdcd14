//! # Zero-Knowledge Threshold Proofs
//!
//! A maker hides a minimum price and amount behind a Poseidon commitment.
//! A taker's fill is authorized by a Groth16 proof over BN254 that the
//! offered terms meet those hidden minimums, without revealing them.
//!
//! ## Architecture
//!
//! ```text
//! commitment.rs   Poseidon(price, amount, nonce) commitments, bounds, nonces
//! poseidon.rs     in-circuit Poseidon gadget (same permutation as native)
//! circuit.rs      R1CS statement (ThresholdCircuit)
//! prover.rs       ProofBackend seam + Groth16Backend
//! verifier.rs     local Groth16 verification (ThresholdVerifier)
//! encoding.rs     ABI layout consumed by the on-chain verifier
//! pipeline.rs     input validation + bounded proving worker pool
//! ```
//!
//! ## Security Model
//!
//! - **Hiding**: the nonce is uniformly random in a 64-bit range.
//! - **Binding**: Poseidon collision resistance over BN254/Fr.
//! - **Soundness**: Groth16 knowledge-soundness in the generic group model.
//! - **Range checks**: 64-bit decomposition with boolean enforcement on every
//!   limb, so `offered - secret` cannot wrap around the field.
//!
//! The trusted setup is per-circuit. Production deployments load an
//! MPC-generated proving key via [`prover::Groth16Backend::load`].

use ark_ff::{BigInt, PrimeField};
use ethers_core::types::U256;

pub mod circuit;
pub mod commitment;
pub mod encoding;
pub mod pipeline;
pub mod poseidon;
pub mod prover;
pub mod verifier;

pub use circuit::ThresholdCircuit;
pub use commitment::{Commitment, CommitmentError, SecretParameters, Violation, ViolationKind};
pub use encoding::{decode, encode_for_verifier};
pub use pipeline::ProofPipeline;
pub use prover::{Groth16Backend, ProofArtifact, ProofBackend, ProofError, ProofInputs};
pub use verifier::ThresholdVerifier;

/// Canonical integer representation of a 4-limb prime field element.
///
/// Both BN254 fields (`Fr` and `Fq`) have 4 x 64-bit limbs, little-endian,
/// which is exactly the limb order of `U256`.
pub fn field_to_u256<F: PrimeField<BigInt = BigInt<4>>>(value: F) -> U256 {
    U256(value.into_bigint().0)
}

/// Inverse of [`field_to_u256`]. `None` when `value` is not below the modulus.
pub fn u256_to_field<F: PrimeField<BigInt = BigInt<4>>>(value: U256) -> Option<F> {
    F::from_bigint(BigInt::new(value.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::{Fq, Fr};

    #[test]
    fn field_u256_round_trip() {
        let x = Fr::from(123_456_789u64);
        assert_eq!(field_to_u256(x), U256::from(123_456_789u64));
        assert_eq!(u256_to_field::<Fr>(field_to_u256(x)), Some(x));

        let y = -Fq::from(1u64);
        assert_eq!(u256_to_field::<Fq>(field_to_u256(y)), Some(y));
    }

    #[test]
    fn non_canonical_values_rejected() {
        assert_eq!(u256_to_field::<Fr>(U256::MAX), None);
        assert_eq!(u256_to_field::<Fr>(U256(Fr::MODULUS.0)), None);
    }
}
