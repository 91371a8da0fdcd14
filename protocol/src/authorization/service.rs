//! Fill authorization.
//!
//! ```text
//! Idle ─► LookedUp ─► ThresholdChecked ─► ProofGenerated ─► OrderRebuilt ─► Signed
//!   │        │               │                  │                │
//!   └ OrderNotFound          │                  │                └ SigningFailed
//!            ├ MakerMismatch │                  └ RebuildFailed
//!            └ InsufficientAmount
//!                            └ ProofFailed
//! ```
//!
//! Authorization never mutates the registry or the catalog. Nothing is
//! retried here; every failure goes back to the caller with a stable code.

use std::fmt;
use std::sync::Arc;

use ethers_core::types::{Address, H256, U256};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::registry::{OrderRegistry, Registration, RegistryError, ResolvedOrder};
use super::request::{FillRequest, RegisterOrderRequest};
use crate::config::{ConfigError, ServiceConfig};
use crate::error::{ErrorCode, RequestError};
use crate::order::{
    order_hash, rebuild_with_proof, LimitOrder, OrderDomain, OrderParameters, OrderSigner,
    RebuildError, SignerError,
};
use crate::serde_util::{hex_bytes, u256_dec};
use crate::zkp::{Commitment, ProofBackend, ProofError, ProofInputs, ProofPipeline, SecretParameters};

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

/// Progress of one fill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStage {
    Idle,
    LookedUp,
    ThresholdChecked,
    ProofGenerated,
    OrderRebuilt,
    Signed,
}

impl FillStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStage::Idle => "idle",
            FillStage::LookedUp => "looked_up",
            FillStage::ThresholdChecked => "threshold_checked",
            FillStage::ProofGenerated => "proof_generated",
            FillStage::OrderRebuilt => "order_rebuilt",
            FillStage::Signed => "signed",
        }
    }
}

impl fmt::Display for FillStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Registration(#[from] RegistryError),

    #[error("no registered order for {0:#x}")]
    OrderNotFound(H256),

    #[error("order maker {order_maker:#x} does not match registered maker {registered:#x}")]
    MakerMismatch {
        order_maker: Address,
        registered: Address,
    },

    /// Carries the price threshold for operator logs. Never the amount.
    #[error("fill amount {fill_amount} is below the required minimum {required}")]
    InsufficientAmount { fill_amount: U256, required: U256 },

    #[error("proof failed: {0}")]
    ProofFailed(#[source] ProofError),

    #[error("order rebuild failed: {0}")]
    RebuildFailed(#[source] RebuildError),

    #[error("order signing failed: {0}")]
    SigningFailed(#[source] SignerError),
}

impl AuthorizationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(e) => e.code(),
            Self::Registration(e) => e.code(),
            Self::OrderNotFound(_) => ErrorCode::OrderNotFound,
            Self::MakerMismatch { .. } => ErrorCode::MakerMismatch,
            Self::InsufficientAmount { .. } => ErrorCode::InsufficientAmount,
            Self::ProofFailed(_) => ErrorCode::ProofFailed,
            Self::RebuildFailed(_) => ErrorCode::RebuildFailed,
            Self::SigningFailed(_) => ErrorCode::SigningFailed,
        }
    }

    /// The last stage the request completed before failing.
    pub fn stage(&self) -> FillStage {
        match self {
            Self::InvalidRequest(_) | Self::Registration(_) | Self::OrderNotFound(_) => {
                FillStage::Idle
            }
            Self::MakerMismatch { .. } | Self::InsufficientAmount { .. } => FillStage::LookedUp,
            Self::ProofFailed(_) => FillStage::ThresholdChecked,
            Self::RebuildFailed(_) => FillStage::ProofGenerated,
            Self::SigningFailed(_) => FillStage::OrderRebuilt,
        }
    }

    /// `true` when the request was legitimately refused, `false` when the
    /// service could not reach a decision.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::MakerMismatch { .. }
                | Self::InsufficientAmount { .. }
                | Self::ProofFailed(ProofError::ConstraintViolation(_))
        )
    }

    /// Reason safe to show the caller. Prover internals stay in the logs.
    pub fn public_reason(&self) -> String {
        match self {
            Self::InvalidRequest(e) => e.to_string(),
            Self::Registration(e) => e.to_string(),
            Self::OrderNotFound(_) => "no registered order for this hash".to_string(),
            Self::MakerMismatch { .. } => "order maker does not match the registered maker".to_string(),
            Self::InsufficientAmount { .. } => self.to_string(),
            Self::ProofFailed(ProofError::ConstraintViolation(_)) => {
                "offered terms do not satisfy the order's thresholds".to_string()
            }
            Self::ProofFailed(ProofError::CommitmentMismatch) => {
                "registered secrets do not open the order commitment".to_string()
            }
            Self::ProofFailed(ProofError::InvalidParameters(_)) => {
                "proof inputs are out of range".to_string()
            }
            Self::ProofFailed(_) => "proof generation failed".to_string(),
            Self::RebuildFailed(_) => "order could not be rebuilt".to_string(),
            Self::SigningFailed(_) => "order could not be signed".to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            reason: self.public_reason(),
            stage: self.stage(),
            retryable: self.code().is_retryable()
                || matches!(self, Self::ProofFailed(ProofError::ProverFailure(_))),
        }
    }
}

/// Wire form of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub reason: String,
    pub stage: FillStage,
    pub retryable: bool,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// A rebuilt, signed order ready for on-chain submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillAuthorization {
    pub order: LimitOrder,
    #[serde(with = "hex_bytes")]
    pub extension: Vec<u8>,
    /// 65-byte `r || s || v`, hex.
    pub signature: String,
    /// EIP-712 hash of the rebuilt order.
    pub order_hash: H256,
    #[serde(with = "u256_dec")]
    pub fill_amount: U256,
}

// ---------------------------------------------------------------------------
// AuthorizationService
// ---------------------------------------------------------------------------

/// Registers orders and authorizes fills against them.
#[derive(Clone)]
pub struct AuthorizationService {
    registry: Arc<OrderRegistry>,
    pipeline: ProofPipeline,
    signer: Arc<dyn OrderSigner>,
    domain: OrderDomain,
    predicate_address: Address,
}

impl AuthorizationService {
    pub fn new(
        registry: Arc<OrderRegistry>,
        pipeline: ProofPipeline,
        signer: Arc<dyn OrderSigner>,
        domain: OrderDomain,
        predicate_address: Address,
    ) -> Self {
        Self {
            registry,
            pipeline,
            signer,
            domain,
            predicate_address,
        }
    }

    /// Service with a fresh registry, wired from `config`.
    pub fn from_config(
        config: &ServiceConfig,
        backend: Arc<dyn ProofBackend>,
        signer: Arc<dyn OrderSigner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let chain_id = config
            .resolved_chain_id()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "chainId".to_string(),
                reason: format!("no chain id for network '{}'", config.network),
            })?;

        Ok(Self::new(
            Arc::new(OrderRegistry::new()),
            ProofPipeline::from_config(backend, config),
            signer,
            OrderDomain::new(chain_id, config.router_address),
            config.predicate_address,
        ))
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    pub fn domain(&self) -> &OrderDomain {
        &self.domain
    }

    /// Store terms and secrets under `commitment`, and under `order_hash`
    /// when given. Re-registering a commitment replaces it.
    pub fn register_order(
        &self,
        commitment: Commitment,
        params: OrderParameters,
        secrets: SecretParameters,
        order_hash: Option<H256>,
    ) -> Result<(), RegistryError> {
        self.registry.register(Registration {
            commitment,
            params,
            secrets,
            order_hash,
        })
    }

    /// Validate and register a raw request. Returns the commitment.
    pub fn handle_register(&self, request: &RegisterOrderRequest) -> Result<Commitment, AuthorizationError> {
        let registration = request.validate()?;
        let commitment = registration.commitment;
        self.registry.register(registration)?;
        Ok(commitment)
    }

    /// Validate and authorize a raw fill request.
    pub async fn handle_fill(&self, request: &FillRequest) -> Result<FillAuthorization, AuthorizationError> {
        let fill = request.validate()?;
        self.authorize_fill(fill.order_hash, fill.fill_amount).await
    }

    /// Produce a rebuilt order gated on a fresh proof, signed for the
    /// configured domain.
    pub async fn authorize_fill(
        &self,
        order_hash: H256,
        fill_amount: U256,
    ) -> Result<FillAuthorization, AuthorizationError> {
        let result = self.run_fill(order_hash, fill_amount).await;
        if let Err(e) = &result {
            match e {
                AuthorizationError::ProofFailed(ProofError::ProverFailure(detail)) => {
                    error!(?order_hash, stage = %e.stage(), detail, "fill failed in prover")
                }
                e if e.is_denial() => {
                    info!(?order_hash, stage = %e.stage(), code = %e.code(), "fill denied")
                }
                e => warn!(?order_hash, stage = %e.stage(), code = %e.code(), error = %e, "fill failed"),
            }
        }
        result
    }

    async fn run_fill(
        &self,
        lookup_hash: H256,
        fill_amount: U256,
    ) -> Result<FillAuthorization, AuthorizationError> {
        // 1-2. Terms by order hash, then secrets by commitment, in one read.
        let ResolvedOrder { params, secrets } = self
            .registry
            .resolve(&lookup_hash)
            .ok_or(AuthorizationError::OrderNotFound(lookup_hash))?;
        debug!(order_hash = ?lookup_hash, commitment = %params.commitment, stage = %FillStage::LookedUp, "fill stage");

        // 3. Maker binding.
        if params.maker != secrets.maker_identity {
            return Err(AuthorizationError::MakerMismatch {
                order_maker: params.maker,
                registered: secrets.maker_identity,
            });
        }

        // 4. Threshold. Cheap rejection before any proving work.
        if fill_amount < secrets.secret_price {
            return Err(AuthorizationError::InsufficientAmount {
                fill_amount,
                required: secrets.secret_price,
            });
        }
        debug!(order_hash = ?lookup_hash, stage = %FillStage::ThresholdChecked, "fill stage");

        // 5. Proof.
        let inputs = ProofInputs {
            secret_price: secrets.secret_price,
            secret_amount: secrets.secret_amount,
            commitment: params.commitment,
            nonce: secrets.nonce,
            offered_price: fill_amount,
            offered_amount: fill_amount,
        };
        let proof = self
            .pipeline
            .generate_encoded(inputs)
            .await
            .map_err(AuthorizationError::ProofFailed)?;
        debug!(order_hash = ?lookup_hash, proof_len = proof.len(), stage = %FillStage::ProofGenerated, "fill stage");

        // 6. Rebuild around the proof.
        let built = rebuild_with_proof(&params, self.predicate_address, proof)
            .map_err(AuthorizationError::RebuildFailed)?;
        debug!(
            order_hash = ?lookup_hash,
            salt = %built.order.salt,
            extension_len = built.extension.len(),
            stage = %FillStage::OrderRebuilt,
            "fill stage"
        );

        // 7. Sign.
        let signature = self
            .signer
            .sign_order(&built.order, &self.domain)
            .await
            .map_err(AuthorizationError::SigningFailed)?;
        let rebuilt_hash = order_hash(&built.order, &self.domain);

        info!(
            order_hash = ?lookup_hash,
            rebuilt_hash = ?rebuilt_hash,
            stage = %FillStage::Signed,
            "fill authorized"
        );
        Ok(FillAuthorization {
            order: built.order,
            extension: built.extension,
            signature: signature.to_hex(),
            order_hash: rebuilt_hash,
            fill_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::LocalOrderSigner;
    use crate::zkp::commitment::commit_params;
    use crate::zkp::prover::fixture;
    use crate::zkp::ProofArtifact;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PRICE: u64 = 3_000_000_000;

    /// Fails the test if the prover is ever reached.
    struct UnreachableBackend;

    impl ProofBackend for UnreachableBackend {
        fn prove(&self, _: &ProofInputs) -> Result<ProofArtifact, ProofError> {
            panic!("prover must not run");
        }
    }

    struct BrokenBackend;

    impl ProofBackend for BrokenBackend {
        fn prove(&self, _: &ProofInputs) -> Result<ProofArtifact, ProofError> {
            Err(ProofError::ProverFailure("witness file missing at /srv/zk".into()))
        }
    }

    fn signer() -> Arc<LocalOrderSigner> {
        Arc::new(LocalOrderSigner::from_private_key(DEV_KEY).unwrap())
    }

    fn service(backend: Arc<dyn ProofBackend>) -> AuthorizationService {
        AuthorizationService::new(
            Arc::new(OrderRegistry::new()),
            ProofPipeline::new(backend, 2),
            signer(),
            OrderDomain::new(8453, Address::repeat_byte(0x11)),
            Address::repeat_byte(0x44),
        )
    }

    /// Registers the reference order, returns its lookup hash.
    fn register(svc: &AuthorizationService, maker_identity: Address) -> H256 {
        let maker = signer().address();
        let secrets = SecretParameters {
            secret_price: U256::from(PRICE),
            secret_amount: U256::from(PRICE),
            nonce: U256::from(123_456_789u64),
            maker_identity,
        };
        let commitment = commit_params(&secrets).unwrap();
        let params = OrderParameters::new(
            maker,
            Address::repeat_byte(0x22),
            Address::repeat_byte(0x33),
            U256::from(1_000_000_000_000_000_000u64),
            U256::from(PRICE),
            commitment,
        );
        let hash = order_hash(&params.initial_order(), svc.domain());
        svc.register_order(commitment, params, secrets, Some(hash)).unwrap();
        hash
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let svc = service(Arc::new(UnreachableBackend));
        let err = svc.authorize_fill(H256::repeat_byte(1), U256::from(PRICE)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::OrderNotFound);
        assert_eq!(err.stage(), FillStage::Idle);
        assert!(!err.is_denial());
    }

    #[tokio::test]
    async fn below_threshold_never_reaches_prover() {
        let svc = service(Arc::new(UnreachableBackend));
        let hash = register(&svc, signer().address());

        let err = svc
            .authorize_fill(hash, U256::from(2_500_000_000u64))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientAmount);
        assert!(err.is_denial());
        let reason = err.public_reason();
        assert!(reason.contains("2500000000"));
        assert!(reason.contains("3000000000"));
        assert!(!reason.contains("123456789"));
    }

    #[tokio::test]
    async fn maker_mismatch_checked_before_amount() {
        let svc = service(Arc::new(UnreachableBackend));
        let hash = register(&svc, Address::repeat_byte(0x99));

        let err = svc
            .authorize_fill(hash, U256::from(10 * PRICE))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MakerMismatch);
        assert_eq!(err.stage(), FillStage::LookedUp);
    }

    #[tokio::test]
    async fn prover_failure_is_opaque() {
        let svc = service(Arc::new(BrokenBackend));
        let hash = register(&svc, signer().address());

        let err = svc.authorize_fill(hash, U256::from(PRICE)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProofFailed);
        assert_eq!(err.stage(), FillStage::ThresholdChecked);
        assert!(!err.is_denial());
        let body = err.to_body();
        assert!(body.retryable);
        assert!(!body.reason.contains("/srv/zk"));
    }

    #[tokio::test]
    async fn invalid_fill_request_is_rejected_up_front() {
        let svc = service(Arc::new(UnreachableBackend));
        let err = svc
            .handle_fill(&FillRequest {
                order_hash: "nope".into(),
                fill_amount: "1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn authorized_fill_is_signed_by_configured_signer() {
        let svc = service(fixture::backend());
        let hash = register(&svc, signer().address());

        let auth = svc.authorize_fill(hash, U256::from(3_200_000_000u64)).await.unwrap();
        assert!(!auth.extension.is_empty());
        assert!(auth.order.maker_traits.has_extension());
        assert_ne!(auth.order_hash, hash);
        assert_eq!(auth.order_hash, order_hash(&auth.order, svc.domain()));

        let bytes = hex::decode(auth.signature.trim_start_matches("0x")).unwrap();
        let sig = ethers_core::types::Signature::try_from(bytes.as_slice()).unwrap();
        assert_eq!(sig.recover(auth.order_hash).unwrap(), signer().address());
    }

    #[tokio::test]
    async fn fill_through_old_hash_uses_latest_terms() {
        let svc = service(fixture::backend());
        let hash = register(&svc, signer().address());

        let commitment = svc.registry().resolve(&hash).unwrap().params.commitment;
        let secrets = svc.registry().secrets(&commitment).unwrap();
        let mut params = svc.registry().params(&commitment).unwrap();
        params.making_amount = U256::from(1u64);
        svc.register_order(commitment, params, secrets, None).unwrap();

        let auth = svc.authorize_fill(hash, U256::from(3_200_000_000u64)).await.unwrap();
        assert_eq!(auth.order.making_amount, U256::from(1u64));
    }

    #[test]
    fn stages_are_ordered() {
        assert!(FillStage::Idle < FillStage::LookedUp);
        assert!(FillStage::OrderRebuilt < FillStage::Signed);
        assert_eq!(FillStage::ThresholdChecked.to_string(), "threshold_checked");
    }
}
