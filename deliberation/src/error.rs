//! Workflow error types
//!
//! Validation failures are returned to callers as explicit results and
//! never retried; storage faults are unexpected operational errors and
//! propagate. Reveal-below-threshold is not an error at all, see
//! `phase::RevealOutcome`.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors surfaced by the review workflow components
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Malformed input: missing required field, out-of-range confidence,
    /// sub-minimum rationale, non-positive threshold.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The workflow facade was used before its store finished setup.
    #[error("Store not initialized; call init() first")]
    NotInitialized,

    /// Ballot submitted against an item whose phase is already revealed.
    #[error("Submissions are closed for {reference}: ballots are revealed")]
    SubmissionClosed { reference: String },

    /// Outcome correction against an id that does not exist.
    #[error("Outcome not found: {outcome_id}")]
    OutcomeNotFound { outcome_id: String },

    /// Storage-layer failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this error is a validation failure (caller input problem
    /// rather than an operational fault).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
