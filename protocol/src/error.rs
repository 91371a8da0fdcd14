//! Stable error codes.
//!
//! Every module keeps its own `thiserror` enum; this is the one vocabulary
//! they all map onto when a failure crosses the service boundary. The
//! strings returned by [`ErrorCode::as_str`] are part of the wire contract.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParameters,
    CommitmentMismatch,
    ConstraintViolation,
    ProverFailure,
    OrderNotFound,
    MakerMismatch,
    InsufficientAmount,
    ProofFailed,
    RebuildFailed,
    SigningFailed,
    DuplicateCommitment,
    NotFound,
    StorageLockTimeout,
    StorageCorrupt,
    StorageIo,
    InvalidRequest,
    InvalidConfig,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameters => "INVALID_PARAMETERS",
            ErrorCode::CommitmentMismatch => "COMMITMENT_MISMATCH",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::ProverFailure => "PROVER_FAILURE",
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::MakerMismatch => "MAKER_MISMATCH",
            ErrorCode::InsufficientAmount => "INSUFFICIENT_AMOUNT",
            ErrorCode::ProofFailed => "PROOF_FAILED",
            ErrorCode::RebuildFailed => "REBUILD_FAILED",
            ErrorCode::SigningFailed => "SIGNING_FAILED",
            ErrorCode::DuplicateCommitment => "DUPLICATE_COMMITMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::StorageLockTimeout => "STORAGE_LOCK_TIMEOUT",
            ErrorCode::StorageCorrupt => "STORAGE_CORRUPT",
            ErrorCode::StorageIo => "STORAGE_IO",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// Whether retrying the identical request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ProverFailure | ErrorCode::StorageLockTimeout | ErrorCode::StorageIo
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// One rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

/// Every problem found in an inbound request, reported together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request: {}", render_fields(.fields))]
pub struct RequestError {
    pub fields: Vec<FieldError>,
}

fn render_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RequestError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidRequest
    }
}

/// Accumulates field errors while parsing a raw request into typed values.
#[derive(Debug, Default)]
pub struct FieldCheck {
    fields: Vec<FieldError>,
}

impl FieldCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, field: &'static str, reason: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            reason: reason.into(),
        });
    }

    /// Record the error of `result` under `field`, returning the value if any.
    pub fn take<T, E: fmt::Display>(&mut self, field: &'static str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.reject(field, e.to_string());
                None
            }
        }
    }

    /// Finish with a value assembled from taken fields. [`take`](Self::take)
    /// records an error for every `None` it hands out, so a missing value
    /// always comes with at least one rejected field.
    pub fn finish_with<T>(self, value: Option<T>) -> Result<T, RequestError> {
        match value {
            Some(value) if self.fields.is_empty() => Ok(value),
            value => {
                debug_assert!(
                    value.is_some() || !self.fields.is_empty(),
                    "field dropped without a recorded error"
                );
                Err(RequestError { fields: self.fields })
            }
        }
    }

    pub fn finish(self) -> Result<(), RequestError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(RequestError {
                fields: self.fields,
            })
        }
    }
}
