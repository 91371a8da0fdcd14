//! In-memory registry of order terms and maker secrets.
//!
//! Secrets and terms are keyed by the full commitment. An order hash, when
//! one is supplied, maps to its commitment, since fill requests arrive
//! addressed by hash; the hash always resolves to the latest terms. The registry is an ordinary value: each service (and
//! each test) owns its own instance.

use std::collections::HashMap;

use ethers_core::types::H256;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::order::OrderParameters;
use crate::zkp::commitment::{self, join_violations, SecretParameters, Violation};
use crate::zkp::Commitment;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid secret parameters: {}", join_violations(.0))]
    InvalidParameters(Vec<Violation>),

    #[error("commitment mismatch: {0}")]
    CommitmentMismatch(&'static str),
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameters(_) => ErrorCode::InvalidParameters,
            Self::CommitmentMismatch(_) => ErrorCode::CommitmentMismatch,
        }
    }
}

/// One registration: the commitment, its terms and its opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub commitment: Commitment,
    pub params: OrderParameters,
    pub secrets: SecretParameters,
    pub order_hash: Option<H256>,
}

#[derive(Default)]
struct Entries {
    secrets: HashMap<Commitment, SecretParameters>,
    params: HashMap<Commitment, OrderParameters>,
    by_hash: HashMap<H256, Commitment>,
}

/// Terms and secrets read together for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub params: OrderParameters,
    pub secrets: SecretParameters,
}

#[derive(Default)]
pub struct OrderRegistry {
    entries: RwLock<Entries>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `registration`, replacing whatever was held for its commitment.
    ///
    /// The secrets must be in range and must open `commitment`, and the
    /// terms must carry the same commitment.
    pub fn register(&self, registration: Registration) -> Result<(), RegistryError> {
        let Registration {
            commitment,
            params,
            secrets,
            order_hash,
        } = registration;

        commitment::validate(&secrets).map_err(RegistryError::InvalidParameters)?;
        if params.commitment != commitment {
            return Err(RegistryError::CommitmentMismatch(
                "order parameters carry a different commitment",
            ));
        }
        if !commitment::verify(&commitment, &secrets) {
            return Err(RegistryError::CommitmentMismatch(
                "secrets do not open the commitment",
            ));
        }

        let mut entries = self.entries.write();
        if let Some(hash) = order_hash {
            entries.by_hash.insert(hash, commitment);
        }
        let replaced = entries.params.insert(commitment, params).is_some();
        entries.secrets.insert(commitment, secrets);
        info!(%commitment, ?order_hash, replaced, "order registered");
        Ok(())
    }

    /// Resolve hash, then commitment, then terms and secrets under one read
    /// guard, so a concurrent registration is seen entirely or not at all.
    pub fn resolve(&self, order_hash: &H256) -> Option<ResolvedOrder> {
        let entries = self.entries.read();
        let found = entries.by_hash.get(order_hash).and_then(|commitment| {
            Some(ResolvedOrder {
                params: entries.params.get(commitment)?.clone(),
                secrets: entries.secrets.get(commitment)?.clone(),
            })
        });
        debug!(?order_hash, found = found.is_some(), "order hash lookup");
        found
    }

    pub fn params_by_hash(&self, order_hash: &H256) -> Option<OrderParameters> {
        let entries = self.entries.read();
        let commitment = entries.by_hash.get(order_hash)?;
        entries.params.get(commitment).cloned()
    }

    pub fn params(&self, commitment: &Commitment) -> Option<OrderParameters> {
        self.entries.read().params.get(commitment).cloned()
    }

    pub fn secrets(&self, commitment: &Commitment) -> Option<SecretParameters> {
        self.entries.read().secrets.get(commitment).cloned()
    }

    /// Number of registered commitments.
    pub fn len(&self) -> usize {
        self.entries.read().secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::{Address, U256};

    fn secrets(price: u64, nonce: u64) -> SecretParameters {
        SecretParameters {
            secret_price: U256::from(price),
            secret_amount: U256::from(price),
            nonce: U256::from(nonce),
            maker_identity: Address::repeat_byte(0x11),
        }
    }

    fn registration(price: u64, nonce: u64, hash: Option<H256>) -> Registration {
        let s = secrets(price, nonce);
        let c = commitment::commit_params(&s).unwrap();
        let params = OrderParameters::new(
            s.maker_identity,
            Address::repeat_byte(0x22),
            Address::repeat_byte(0x33),
            U256::from(1u64),
            U256::from(price),
            c,
        );
        Registration {
            commitment: c,
            params,
            secrets: s,
            order_hash: hash,
        }
    }

    #[test]
    fn lookups_by_commitment_and_hash() {
        let registry = OrderRegistry::new();
        let hash = H256::repeat_byte(0xAB);
        let r = registration(3_000, 42, Some(hash));
        registry.register(r.clone()).unwrap();

        assert_eq!(registry.params_by_hash(&hash), Some(r.params.clone()));
        assert_eq!(registry.params(&r.commitment), Some(r.params));
        assert_eq!(registry.secrets(&r.commitment), Some(r.secrets));
        assert_eq!(registry.params_by_hash(&H256::zero()), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn hash_index_is_optional() {
        let registry = OrderRegistry::new();
        let r = registration(3_000, 42, None);
        registry.register(r.clone()).unwrap();
        assert!(registry.secrets(&r.commitment).is_some());
        assert_eq!(registry.params_by_hash(&H256::repeat_byte(0xAB)), None);
    }

    #[test]
    fn re_registration_overwrites() {
        let registry = OrderRegistry::new();
        let first = registration(3_000, 42, None);
        registry.register(first.clone()).unwrap();

        let mut second = first.clone();
        second.secrets.maker_identity = Address::repeat_byte(0x99);
        registry.register(second.clone()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.secrets(&first.commitment).unwrap().maker_identity,
            Address::repeat_byte(0x99)
        );
    }

    #[test]
    fn old_hash_sees_replaced_terms() {
        let registry = OrderRegistry::new();
        let hash = H256::repeat_byte(0xAB);
        let mut first = registration(3_000, 42, Some(hash));
        first.params.making_amount = U256::from(1_000u64);
        registry.register(first.clone()).unwrap();

        let mut second = first.clone();
        second.params.making_amount = U256::from(1u64);
        second.order_hash = None;
        registry.register(second.clone()).unwrap();

        let resolved = registry.resolve(&hash).unwrap();
        assert_eq!(resolved.params.making_amount, U256::from(1u64));
        assert_eq!(resolved.secrets, second.secrets);
        assert_eq!(registry.params_by_hash(&hash), Some(second.params));
        assert_eq!(registry.resolve(&H256::zero()), None);
    }

    #[test]
    fn out_of_range_secrets_rejected() {
        let registry = OrderRegistry::new();
        let mut r = registration(3_000, 42, None);
        r.secrets.secret_amount = U256::zero();
        r.secrets.nonce = U256::MAX;
        let err = registry.register(r).unwrap_err();
        match &err {
            RegistryError::InvalidParameters(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.code(), ErrorCode::InvalidParameters);
        assert!(registry.is_empty());
    }

    #[test]
    fn secrets_must_open_commitment() {
        let registry = OrderRegistry::new();
        let mut r = registration(3_000, 42, None);
        r.secrets.nonce = U256::from(43u64);
        let err = registry.register(r).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CommitmentMismatch);

        let mut r = registration(3_000, 42, None);
        r.params.commitment = registration(3_000, 7, None).commitment;
        assert!(matches!(
            registry.register(r),
            Err(RegistryError::CommitmentMismatch(_))
        ));
        assert!(registry.is_empty());
    }
}
