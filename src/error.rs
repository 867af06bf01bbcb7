use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ValidationError;
use crate::state_machine::Status;

/// Why a transition request was refused. The card is left untouched.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionError {
    #[error("invalid transition {from}→{to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("guard failed for {from}→{to}: {}", summarize(.violations))]
    GuardFailed {
        from: Status,
        to: Status,
        violations: Vec<ValidationError>,
    },

    /// An escalation arrived without its own reason or error text.
    #[error("{field} is required for a transition to {to}")]
    MissingField { field: String, to: Status },
}

impl TransitionError {
    /// Rule violations carried by a guard failure; empty for other kinds.
    pub fn violations(&self) -> &[ValidationError] {
        match self {
            TransitionError::GuardFailed { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("card already exists: {0}")]
    DuplicateCard(String),

    #[error("card {id} breaks lifecycle invariants: {}", .problems.join("; "))]
    CorruptRecord { id: String, problems: Vec<String> },

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Rejected(#[from] TransitionError),
}

/// Classifies a collaborator failure for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CollaboratorError {
    /// Content or data problem a human must look at (bad AI output, captcha).
    #[error("Business failure: {0}")]
    Business(String),
    /// Infrastructure problem worth retrying (timeout, network, rate limit).
    #[error("System failure: {0}")]
    System(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::System(_))
    }
}
