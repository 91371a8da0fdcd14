//! # Proof Pipeline
//!
//! Validates inputs, runs the prover on a bounded worker pool and encodes
//! the result for the on-chain verifier.
//!
//! Proving is CPU-bound and takes hundreds of milliseconds to seconds, so it
//! never runs on an async worker thread. Each proof takes a semaphore permit
//! and moves it into a `spawn_blocking` task; the permit is released when the
//! computation finishes, even if the caller already gave up on it. A timeout
//! abandons the computation (it is not killed) and reports `ProverFailure`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::commitment::{self, check_scalar, join_violations, Violation, ViolationKind};
use super::encoding;
use super::prover::{ProofArtifact, ProofBackend, ProofError, ProofInputs};
use crate::config::ServiceConfig;

/// Bounded proving pool in front of a [`ProofBackend`].
#[derive(Clone)]
pub struct ProofPipeline {
    backend: Arc<dyn ProofBackend>,
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Option<Duration>,
}

impl ProofPipeline {
    /// `workers` is clamped to at least one.
    pub fn new(backend: Arc<dyn ProofBackend>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            backend,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout: None,
        }
    }

    pub fn from_config(backend: Arc<dyn ProofBackend>, config: &ServiceConfig) -> Self {
        Self::new(backend, config.prover_workers).with_timeout(config.proof_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Permits not currently held by a running proof.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Every check the proof will attest to, run before any proving work.
    ///
    /// Bounds violations are accumulated. The commitment is only recomputed
    /// when the committed scalars are in range.
    pub fn validate_inputs(inputs: &ProofInputs) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        check_scalar("secretPrice", inputs.secret_price, &mut violations);
        check_scalar("secretAmount", inputs.secret_amount, &mut violations);
        check_scalar("nonce", inputs.nonce, &mut violations);
        check_scalar("offeredPrice", inputs.offered_price, &mut violations);
        check_scalar("offeredAmount", inputs.offered_amount, &mut violations);
        if !violations.is_empty() {
            return Err(violations);
        }

        let recomputed = commitment::commit(inputs.secret_price, inputs.secret_amount, inputs.nonce)
            .map_err(|_| vec![Violation::new("commit", ViolationKind::CommitmentMismatch)])?;
        if recomputed != inputs.commitment {
            violations.push(Violation::new("commit", ViolationKind::CommitmentMismatch));
        }

        violations.extend(inputs.threshold_violations());
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Validate, then prove on the worker pool.
    pub async fn generate_proof(&self, inputs: ProofInputs) -> Result<ProofArtifact, ProofError> {
        Self::validate_inputs(&inputs).map_err(classify)?;

        let commitment = inputs.commitment;
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProofError::ProverFailure("prover pool is closed".into()))?;

        let backend = Arc::clone(&self.backend);
        let started = Instant::now();
        debug!(%commitment, "proof started");

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            backend.prove(&inputs)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        %commitment,
                        timeout_ms = limit.as_millis() as u64,
                        "proof timed out; computation abandoned"
                    );
                    return Err(ProofError::ProverFailure(format!(
                        "proof generation exceeded {} ms",
                        limit.as_millis()
                    )));
                }
            },
            None => task.await,
        };

        let artifact = joined
            .map_err(|e| ProofError::ProverFailure(format!("prover task failed: {}", e)))?
            .map_err(|e| {
                warn!(%commitment, error = %e, "prover returned an error");
                e
            })?;

        if !artifact.is_valid() {
            return Err(ProofError::ConstraintViolation(
                "circuit reported valid = 0".into(),
            ));
        }
        if artifact.commitment() != commitment.as_u256() {
            return Err(ProofError::CommitmentMismatch);
        }

        info!(
            %commitment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "proof generated"
        );
        Ok(artifact)
    }

    /// Prove and ABI-encode in one step. The artifact is dropped here.
    pub async fn generate_encoded(&self, inputs: ProofInputs) -> Result<Vec<u8>, ProofError> {
        let artifact = self.generate_proof(inputs).await?;
        encoding::encode_for_verifier(&artifact)
    }
}

/// Map accumulated violations onto the pipeline's failure taxonomy.
fn classify(violations: Vec<Violation>) -> ProofError {
    let out_of_bounds = violations
        .iter()
        .any(|v| matches!(v.kind, ViolationKind::BelowMinimum | ViolationKind::AboveMaximum));
    if out_of_bounds {
        return ProofError::InvalidParameters(violations);
    }
    if violations
        .iter()
        .any(|v| v.kind == ViolationKind::CommitmentMismatch)
    {
        return ProofError::CommitmentMismatch;
    }
    ProofError::ConstraintViolation(join_violations(&violations))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::prover::fixture;
    use ethers_core::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a structurally valid artifact after sleeping, recording how
    /// many calls overlap.
    struct SlowBackend {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowBackend {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ProofBackend for SlowBackend {
        fn prove(&self, inputs: &ProofInputs) -> Result<ProofArtifact, ProofError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ProofArtifact {
                pi_a: [U256::one(), U256::from(2u64)],
                pi_b: [[U256::one(), U256::one()], [U256::one(), U256::one()]],
                pi_c: [U256::one(), U256::from(2u64)],
                public_signals: [
                    U256::one(),
                    inputs.commitment.as_u256(),
                    inputs.nonce,
                    inputs.offered_price,
                    inputs.offered_amount,
                ],
            })
        }
    }

    struct FailingBackend;

    impl ProofBackend for FailingBackend {
        fn prove(&self, _inputs: &ProofInputs) -> Result<ProofArtifact, ProofError> {
            Err(ProofError::ProverFailure("witness generator crashed".into()))
        }
    }

    #[test]
    fn validation_accepts_exact_threshold() {
        assert!(ProofPipeline::validate_inputs(&fixture::inputs(3_000_000_000, 3_000_000_000)).is_ok());
    }

    #[test]
    fn validation_accumulates_threshold_violations() {
        let err = ProofPipeline::validate_inputs(&fixture::inputs(2_500_000_000, 2_500_000_000))
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.iter().all(|v| v.kind == ViolationKind::BelowThreshold));
    }

    #[test]
    fn validation_detects_commitment_mismatch() {
        let mut inputs = fixture::inputs(3_200_000_000, 3_200_000_000);
        inputs.secret_amount = inputs.secret_amount + 1;
        let err = ProofPipeline::validate_inputs(&inputs).unwrap_err();
        assert_eq!(err[0].kind, ViolationKind::CommitmentMismatch);
        assert!(matches!(classify(err), ProofError::CommitmentMismatch));
    }

    #[test]
    fn out_of_range_offer_is_invalid_parameters() {
        let mut inputs = fixture::inputs(3_200_000_000, 3_200_000_000);
        inputs.offered_amount = U256::from(u64::MAX) + 1;
        inputs.offered_price = U256::zero();
        let err = classify(ProofPipeline::validate_inputs(&inputs).unwrap_err());
        assert!(matches!(err, ProofError::InvalidParameters(ref v) if v.len() == 2));
    }

    #[tokio::test]
    async fn rejected_inputs_never_reach_the_prover() {
        let backend = Arc::new(SlowBackend::new(Duration::from_millis(1)));
        let pipeline = ProofPipeline::new(backend.clone(), 1);
        let err = pipeline
            .generate_proof(fixture::inputs(2_500_000_000, 3_200_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::ConstraintViolation(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_bounds_concurrent_proofs() {
        let backend = Arc::new(SlowBackend::new(Duration::from_millis(40)));
        let pipeline = ProofPipeline::new(backend.clone(), 2);

        let jobs = (0..6).map(|_| {
            let p = pipeline.clone();
            async move { p.generate_proof(fixture::inputs(3_200_000_000, 3_200_000_000)).await }
        });
        let results = futures::future::join_all(jobs).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pipeline.idle_workers(), 2);
    }

    #[tokio::test]
    async fn timeout_is_prover_failure_and_holds_the_permit() {
        let backend = Arc::new(SlowBackend::new(Duration::from_millis(300)));
        let pipeline =
            ProofPipeline::new(backend, 1).with_timeout(Some(Duration::from_millis(20)));

        let err = pipeline
            .generate_proof(fixture::inputs(3_200_000_000, 3_200_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::ProverFailure(ref m) if m.contains("exceeded")));
        assert!(err.code().is_retryable());
        // The abandoned computation still occupies its worker.
        assert_eq!(pipeline.idle_workers(), 0);
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let pipeline = ProofPipeline::new(Arc::new(FailingBackend), 1);
        let err = pipeline
            .generate_proof(fixture::inputs(3_200_000_000, 3_200_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::ProverFailure(_)));
    }

    #[tokio::test]
    async fn groth16_encoded_proof_verifies() {
        let backend = fixture::backend();
        let verifier = backend.verifier();
        let pipeline = ProofPipeline::new(backend, 2);

        let bytes = pipeline
            .generate_encoded(fixture::inputs(3_200_000_000, 3_200_000_000))
            .await
            .unwrap();
        assert_eq!(bytes.len(), crate::config::ENCODED_PROOF_LEN);
        assert!(verifier.verify_encoded(&bytes).unwrap());
    }
}
