//! # Threshold Commitment Engine
//!
//! A maker hides three scalars behind one public field element:
//!
//! ```text
//! C = Poseidon(secretPrice, secretAmount, nonce)      over BN254/Fr
//! ```
//!
//! The hash is circomlib's `Poseidon(3)` (width 4, x^5 S-box, 8 full and
//! 56 partial rounds), computed natively with `light-poseidon`. The proving
//! circuit recomputes exactly this value, so arity and input order
//! (price, amount, nonce) are a hard contract: any drift here makes every
//! downstream proof fail.
//!
//! `C` is the registry key for the secrets and the initial order salt.
//! Hiding comes from the nonce; binding from Poseidon's collision
//! resistance.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ethers_core::types::{Address, U256};
use light_poseidon::{Poseidon, PoseidonHasher};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use super::{field_to_u256, u256_to_field};
use crate::config::{COMMITMENT_ARITY, MAX_SCALAR, MIN_SCALAR};
use crate::error::ErrorCode;
use crate::serde_util::{parse_u256, u256_dec};

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// What went wrong with one field of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    BelowMinimum,
    AboveMaximum,
    CommitmentMismatch,
    BelowThreshold,
}

/// A single validation failure. Validators collect every violation instead
/// of stopping at the first, so callers see all problems at once.
///
/// Messages name the field and the bound, never the offending secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: &'static str, kind: ViolationKind) -> Self {
        Self { field, kind }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::BelowMinimum => write!(f, "{} must be at least {}", self.field, MIN_SCALAR),
            ViolationKind::AboveMaximum => write!(f, "{} must be at most {}", self.field, MAX_SCALAR),
            ViolationKind::CommitmentMismatch => {
                write!(f, "{} does not match the supplied secrets", self.field)
            }
            ViolationKind::BelowThreshold => {
                write!(f, "{} is below the hidden threshold", self.field)
            }
        }
    }
}

pub(crate) fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommitmentError {
    #[error("invalid parameters: {}", join_violations(.0))]
    InvalidParameters(Vec<Violation>),

    #[error("value is not a canonical BN254 scalar")]
    OutOfField,

    #[error("poseidon hash failed: {0}")]
    Hash(String),
}

impl CommitmentError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidParameters
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A Poseidon commitment: one canonical element of the BN254 scalar field.
///
/// Serialised as a decimal string, the format snarkjs and wallets use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Commitment(U256);

impl Commitment {
    /// Wrap a raw integer, rejecting values outside the scalar field.
    pub fn from_u256(value: U256) -> Result<Self, CommitmentError> {
        u256_to_field::<Fr>(value)
            .map(|_| Self(value))
            .ok_or(CommitmentError::OutOfField)
    }

    pub fn from_field(value: Fr) -> Self {
        Self(field_to_u256(value))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn to_field(&self) -> Fr {
        // Construction guarantees the value is canonical.
        Fr::from_le_bytes_mod_order(&u256_le_bytes(self.0))
    }
}

fn u256_le_bytes(v: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    v.to_little_endian(&mut out);
    out
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.0)
    }
}

impl FromStr for Commitment {
    type Err = CommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_u256(s).map_err(|_| CommitmentError::OutOfField)?;
        Self::from_u256(value)
    }
}

impl TryFrom<String> for Commitment {
    type Error = CommitmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Commitment> for String {
    fn from(value: Commitment) -> Self {
        value.0.to_string()
    }
}

/// The maker's hidden thresholds. Lives only in the in-memory registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretParameters {
    #[serde(with = "u256_dec")]
    pub secret_price: U256,
    #[serde(with = "u256_dec")]
    pub secret_amount: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub maker_identity: Address,
}

impl fmt::Debug for SecretParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretParameters")
            .field("secret_price", &"<redacted>")
            .field("secret_amount", &"<redacted>")
            .field("nonce", &"<redacted>")
            .field("maker_identity", &self.maker_identity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Validate / Commit / Verify
// ---------------------------------------------------------------------------

/// Check one scalar against `[MIN_SCALAR, MAX_SCALAR]`, appending to `out`.
pub(crate) fn check_scalar(field: &'static str, value: U256, out: &mut Vec<Violation>) {
    if value < U256::from(MIN_SCALAR) {
        out.push(Violation::new(field, ViolationKind::BelowMinimum));
    } else if value > U256::from(MAX_SCALAR) {
        out.push(Violation::new(field, ViolationKind::AboveMaximum));
    }
}

/// Bounds-check the three committed scalars. All violations are reported.
pub fn validate_scalars(price: U256, amount: U256, nonce: U256) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    check_scalar("secretPrice", price, &mut violations);
    check_scalar("secretAmount", amount, &mut violations);
    check_scalar("nonce", nonce, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

pub fn validate(params: &SecretParameters) -> Result<(), Vec<Violation>> {
    validate_scalars(params.secret_price, params.secret_amount, params.nonce)
}

/// Raw circom-compatible `Poseidon(a, b, c)`.
pub fn poseidon_hash3(inputs: [Fr; COMMITMENT_ARITY]) -> Result<Fr, CommitmentError> {
    let mut hasher = Poseidon::<Fr>::new_circom(COMMITMENT_ARITY)
        .map_err(|e| CommitmentError::Hash(e.to_string()))?;
    hasher
        .hash(&inputs)
        .map_err(|e| CommitmentError::Hash(e.to_string()))
}

/// Compute `Poseidon(price, amount, nonce)` after bounds validation.
pub fn commit(price: U256, amount: U256, nonce: U256) -> Result<Commitment, CommitmentError> {
    validate_scalars(price, amount, nonce).map_err(CommitmentError::InvalidParameters)?;

    let hash = poseidon_hash3([
        Fr::from(price.low_u64()),
        Fr::from(amount.low_u64()),
        Fr::from(nonce.low_u64()),
    ])?;
    Ok(Commitment::from_field(hash))
}

/// Commit to a full parameter set.
pub fn commit_params(params: &SecretParameters) -> Result<Commitment, CommitmentError> {
    commit(params.secret_price, params.secret_amount, params.nonce)
}

/// Recompute and compare. A consistency check only: authorization decisions
/// are made by the proof, not by this function.
pub fn verify(commitment: &Commitment, params: &SecretParameters) -> bool {
    commit_params(params)
        .map(|c| &c == commitment)
        .unwrap_or(false)
}

/// Fresh nonce from the OS RNG, inside the validated scalar range.
pub fn generate_nonce() -> U256 {
    generate_nonce_with(&mut rand::rngs::OsRng)
}

pub fn generate_nonce_with<R: Rng + CryptoRng>(rng: &mut R) -> U256 {
    U256::from(rng.gen_range(MIN_SCALAR..=MAX_SCALAR))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
