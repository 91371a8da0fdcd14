//! # Hidden Threshold R1CS Circuit
//!
//! The statement proved for every authorized fill:
//!
//! ```text
//! "I know (secretPrice, secretAmount) such that:
//!     1. Poseidon(secretPrice, secretAmount, nonce) = commit
//!     2. offeredPrice  >= secretPrice
//!     3. offeredAmount >= secretAmount
//!     4. valid = 1"
//! ```
//!
//! ## Constraint breakdown
//!
//! ### Commitment opening
//!
//! Poseidon width 4 via [`PoseidonGadget`]: 8 full rounds x 4 S-boxes plus
//! 56 partial rounds x 1 S-box, 3 constraints per S-box, about 264 in total.
//!
//! ### Threshold checks
//!
//! `delta = offered - secret` is bit-decomposed into [`RANGE_BITS`] booleans
//! and recomposed. Because `2^64 < |Fr|` the decomposition is unique, so a
//! satisfied system implies `0 <= delta < 2^64` in the integers. The secrets
//! themselves get the same 64-bit decomposition so a huge "secret" cannot
//! wrap the subtraction.
//!
//! ## Public inputs (in order)
//!
//! | index | value |
//! |-------|-------|
//! | 0     | `valid` (always 1) |
//! | 1     | `commit` |
//! | 2     | `nonce` |
//! | 3     | `offeredPrice` |
//! | 4     | `offeredAmount` |

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::poseidon::PoseidonGadget;
use crate::config::{COMMITMENT_ARITY, PUBLIC_SIGNAL_COUNT, RANGE_BITS};

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Every field is `Option<_>` so the same struct serves key generation
/// (no witness) and proving.
#[derive(Clone, Default)]
pub struct ThresholdCircuit {
    // -- Private witness ----------------------------------------------------
    pub secret_price: Option<Fr>,
    pub secret_amount: Option<Fr>,

    // -- Public inputs ------------------------------------------------------
    pub valid: Option<Fr>,
    pub commitment: Option<Fr>,
    pub nonce: Option<Fr>,
    pub offered_price: Option<Fr>,
    pub offered_amount: Option<Fr>,
}

impl ThresholdCircuit {
    /// Fully populated circuit. `valid` is fixed to one.
    pub fn new(
        secret_price: Fr,
        secret_amount: Fr,
        commitment: Fr,
        nonce: Fr,
        offered_price: Fr,
        offered_amount: Fr,
    ) -> Self {
        Self {
            secret_price: Some(secret_price),
            secret_amount: Some(secret_amount),
            valid: Some(Fr::from(1u64)),
            commitment: Some(commitment),
            nonce: Some(nonce),
            offered_price: Some(offered_price),
            offered_amount: Some(offered_amount),
        }
    }

    /// Blank circuit for CRS generation. Same topology, no witness.
    pub fn blank() -> Self {
        Self::default()
    }

    /// Public signals in allocation order, or `None` in key-gen mode.
    pub fn public_inputs(&self) -> Option<[Fr; PUBLIC_SIGNAL_COUNT]> {
        Some([
            self.valid?,
            self.commitment?,
            self.nonce?,
            self.offered_price?,
            self.offered_amount?,
        ])
    }
}

// ---------------------------------------------------------------------------
// Constraint synthesizer
// ---------------------------------------------------------------------------

impl ConstraintSynthesizer<Fr> for ThresholdCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // ===================================================================
        // 1. Public inputs. Allocation order defines the verifier's vector.
        // ===================================================================

        let valid_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "valid"), || {
            self.valid.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let commitment_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "commitment"), || {
            self.commitment.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nonce_var = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "nonce"), || {
            self.nonce.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let offered_price_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "offered_price"), || {
                self.offered_price.ok_or(SynthesisError::AssignmentMissing)
            })?;
        let offered_amount_var =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "offered_amount"), || {
                self.offered_amount.ok_or(SynthesisError::AssignmentMissing)
            })?;

        // ===================================================================
        // 2. Private witnesses
        // ===================================================================

        let price_var = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "secret_price"), || {
            self.secret_price.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let amount_var = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "secret_amount"), || {
            self.secret_amount.ok_or(SynthesisError::AssignmentMissing)
        })?;

        // ===================================================================
        // 3. valid == 1
        // ===================================================================

        valid_var.enforce_equal(&FpVar::<Fr>::one())?;

        // ===================================================================
        // 4. Commitment opening
        // ===================================================================

        let poseidon = PoseidonGadget::circom(COMMITMENT_ARITY)?;
        let computed = poseidon.hash(&[price_var.clone(), amount_var.clone(), nonce_var])?;
        computed.enforce_equal(&commitment_var)?;

        // ===================================================================
        // 5. Secrets fit RANGE_BITS
        // ===================================================================

        enforce_range(&cs, &price_var, self.secret_price)?;
        enforce_range(&cs, &amount_var, self.secret_amount)?;

        // ===================================================================
        // 6. offered >= secret  <=>  offered - secret in [0, 2^RANGE_BITS)
        // ===================================================================

        let price_delta = &offered_price_var - &price_var;
        enforce_range(&cs, &price_delta, difference(self.offered_price, self.secret_price))?;

        let amount_delta = &offered_amount_var - &amount_var;
        enforce_range(&cs, &amount_delta, difference(self.offered_amount, self.secret_amount))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Allocate `RANGE_BITS` boolean witnesses for `value`, recompose them and
/// enforce equality with `var`.
fn enforce_range(
    cs: &ConstraintSystemRef<Fr>,
    var: &FpVar<Fr>,
    value: Option<Fr>,
) -> Result<(), SynthesisError> {
    let bits = value.map(to_bits);

    let mut reconstructed = FpVar::<Fr>::zero();
    let mut power_of_two = Fr::from(1u64);

    for i in 0..RANGE_BITS {
        let bit = Boolean::<Fr>::new_witness(ark_relations::ns!(cs, "range_bit"), || {
            bits.as_ref()
                .map(|b| b[i])
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        reconstructed += FpVar::<Fr>::from(bit) * power_of_two;
        power_of_two += power_of_two;
    }

    reconstructed.enforce_equal(var)
}

fn difference(minuend: Option<Fr>, subtrahend: Option<Fr>) -> Option<Fr> {
    Some(minuend? - subtrahend?)
}

/// Little-endian bits of the low `RANGE_BITS` of the canonical integer.
fn to_bits(value: Fr) -> Vec<bool> {
    value
        .into_bigint()
        .0
        .iter()
        .flat_map(|limb| (0..64).map(move |i| (limb >> i) & 1 == 1))
        .take(RANGE_BITS)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
