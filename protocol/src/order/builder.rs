//! Order rebuild at fill time.
//!
//! Given registered terms and an encoded proof, produce a structurally new
//! order: same maker, assets and amounts; new extension carrying the ZK
//! gate; salt re-derived so its low 160 bits bind the new extension and its
//! high 96 bits keep the commitment tag.

use ethers_core::types::{Address, U256};
use serde::Serialize;

use super::extension::{zk_extension, Extension, ExtensionError};
use super::salt::{self, SaltError};
use super::types::{LimitOrder, OrderParameters};
use crate::error::ErrorCode;
use crate::serde_util::hex_bytes;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error(transparent)]
    Salt(#[from] SaltError),

    #[error("encoded proof is empty")]
    EmptyProof,
}

impl RebuildError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::RebuildFailed
    }
}

/// An order plus the extension bytes its salt is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltOrder {
    pub order: LimitOrder,
    #[serde(with = "hex_bytes")]
    pub extension: Vec<u8>,
}

/// The value whose low 96 bits tag the rebuilt salt.
///
/// An order first signed without an extension has `salt == commitment`, so
/// its original salt is used as-is. Otherwise the original salt already
/// holds an extension hash and the full commitment is used instead.
pub fn salt_source(params: &OrderParameters) -> U256 {
    if params.original_extension.is_empty() {
        params.original_salt
    } else {
        params.commitment.as_u256()
    }
}

/// Attach `extension` to the registered terms.
///
/// Empty extensions leave the original salt and traits untouched.
pub fn build_order(params: &OrderParameters, extension: &Extension) -> Result<BuiltOrder, RebuildError> {
    let bytes = extension.encode()?;
    let mut order = params.initial_order();

    if bytes.is_empty() {
        order.maker_traits = order.maker_traits.with_extension(false);
        return Ok(BuiltOrder {
            order,
            extension: bytes,
        });
    }

    order.salt = salt::derive_salt(salt_source(params), &bytes)?;
    order.maker_traits = order.maker_traits.with_extension(true);
    Ok(BuiltOrder {
        order,
        extension: bytes,
    })
}

/// Rebuild with the hidden-threshold gate around `encoded_proof`.
pub fn rebuild_with_proof(
    params: &OrderParameters,
    predicate_address: Address,
    encoded_proof: Vec<u8>,
) -> Result<BuiltOrder, RebuildError> {
    if encoded_proof.is_empty() {
        return Err(RebuildError::EmptyProof);
    }
    build_order(params, &zk_extension(predicate_address, encoded_proof))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::extension::ZkPredicate;
    use crate::order::salt::{matches_extension, truncate_commitment, unpack};
    use crate::zkp::commitment::commit;

    fn params() -> OrderParameters {
        let c = commit(
            U256::from(3_000_000_000u64),
            U256::from(3_000_000_000u64),
            U256::from(123_456_789u64),
        )
        .unwrap();
        OrderParameters::new(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            Address::repeat_byte(0x33),
            U256::from(1_000_000_000_000_000_000u64),
            U256::from(3_000_000_000u64),
            c,
        )
    }

    #[test]
    fn rebuilt_order_keeps_economic_terms() {
        let p = params();
        let built = rebuild_with_proof(&p, Address::repeat_byte(0x44), vec![1u8; 416]).unwrap();

        assert_eq!(built.order.maker, p.maker);
        assert_eq!(built.order.maker_asset, p.maker_asset);
        assert_eq!(built.order.taker_asset, p.taker_asset);
        assert_eq!(built.order.making_amount, p.making_amount);
        assert_eq!(built.order.taking_amount, p.taking_amount);
        assert!(built.order.maker_traits.has_extension());
    }

    #[test]
    fn rebuilt_salt_binds_extension_and_tags_commitment() {
        let p = params();
        let built = rebuild_with_proof(&p, Address::repeat_byte(0x44), vec![1u8; 416]).unwrap();

        assert!(!built.extension.is_empty());
        assert_ne!(built.order.salt, p.commitment.as_u256());
        assert!(matches_extension(built.order.salt, &built.extension));
        assert_eq!(
            unpack(built.order.salt).commitment,
            truncate_commitment(p.commitment.as_u256())
        );
    }

    #[test]
    fn proof_is_recoverable_from_extension() {
        let proof = vec![9u8; 416];
        let built = rebuild_with_proof(&params(), Address::repeat_byte(0x44), proof.clone()).unwrap();
        let ext = Extension::decode(&built.extension).unwrap();
        assert_eq!(ZkPredicate::decode(&ext.predicate).unwrap().proof, proof);
    }

    #[test]
    fn prior_extension_uses_full_commitment() {
        let mut p = params();
        p.original_extension = vec![0xEE; 40];
        p.original_salt = U256::from(0xFFFFu64);
        assert_eq!(salt_source(&p), p.commitment.as_u256());

        let built = rebuild_with_proof(&p, Address::zero(), vec![1]).unwrap();
        assert_eq!(
            unpack(built.order.salt).commitment,
            truncate_commitment(p.commitment.as_u256())
        );
    }

    #[test]
    fn empty_extension_keeps_original_salt() {
        let p = params();
        let built = build_order(&p, &Extension::default()).unwrap();
        assert_eq!(built.order.salt, p.original_salt);
        assert!(built.extension.is_empty());
        assert!(!built.order.maker_traits.has_extension());
    }

    #[test]
    fn empty_proof_rejected() {
        let err = rebuild_with_proof(&params(), Address::zero(), Vec::new()).unwrap_err();
        assert_eq!(err, RebuildError::EmptyProof);
        assert_eq!(err.code(), ErrorCode::RebuildFailed);
    }
}
