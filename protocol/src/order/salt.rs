//! # Salt Codec
//!
//! Once an order carries an extension, the limit-order protocol requires
//! the low 160 bits of its salt to equal the low 160 bits of
//! `keccak256(extension)`. The remaining 96 bits carry the truncated
//! commitment:
//!
//! ```text
//!  255            160 159                                  0
//! +------------------+-------------------------------------+
//! |  commitment mod  |  keccak256(extension) mod 2^160     |
//! |      2^96        |                                     |
//! +------------------+-------------------------------------+
//! ```
//!
//! The truncated value is a tag, not a key. Registry lookups always use
//! the full commitment.

use ethers_core::types::U256;
use ethers_core::utils::keccak256;

use crate::config::{low_mask, COMMITMENT_BITS, EXTENSION_HASH_BITS};
use crate::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaltError {
    #[error("extension hash exceeds 160 bits")]
    ExtensionHashTooWide,

    #[error("packed salt exceeds 256 bits")]
    Overflow,
}

impl SaltError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidParameters
    }
}

/// The two halves of a packed salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltParts {
    /// Low 96 bits of the commitment.
    pub commitment: U256,
    /// Low 160 bits of the extension hash.
    pub extension_hash: U256,
}

/// Low 96 bits of `commitment`.
pub fn truncate_commitment(commitment: U256) -> U256 {
    commitment & low_mask(COMMITMENT_BITS)
}

/// `keccak256(extension)` truncated to its low 160 bits.
pub fn compute_extension_hash(extension: &[u8]) -> U256 {
    U256::from_big_endian(&keccak256(extension)) & low_mask(EXTENSION_HASH_BITS)
}

/// `(commitment mod 2^96) << 160 | extension_hash`.
pub fn pack(commitment: U256, extension_hash: U256) -> Result<U256, SaltError> {
    if extension_hash > low_mask(EXTENSION_HASH_BITS) {
        return Err(SaltError::ExtensionHashTooWide);
    }
    let high = truncate_commitment(commitment)
        .checked_mul(U256::one() << EXTENSION_HASH_BITS)
        .ok_or(SaltError::Overflow)?;
    Ok(high | extension_hash)
}

pub fn unpack(salt: U256) -> SaltParts {
    SaltParts {
        commitment: salt >> EXTENSION_HASH_BITS,
        extension_hash: salt & low_mask(EXTENSION_HASH_BITS),
    }
}

/// Salt for an order carrying `extension`.
pub fn derive_salt(commitment: U256, extension: &[u8]) -> Result<U256, SaltError> {
    pack(commitment, compute_extension_hash(extension))
}

/// Whether `salt` is bound to `extension` under the protocol's rule.
pub fn matches_extension(salt: U256, extension: &[u8]) -> bool {
    unpack(salt).extension_hash == compute_extension_hash(extension)
}
