//! Contract violations raised by validators and entity constructors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for operations that check contracts.
pub type ContractResult<T> = Result<T, Violation>;

/// A broken contract, classified into exactly one of three kinds.
///
/// - `Precondition`: the caller supplied invalid input (blank field,
///   reference to an undeclared entity, malformed key). Not retryable.
/// - `Invariant`: the requested entity or change would break a structural
///   rule (self-referential link, cluster role mismatch). Not retryable.
/// - `Postcondition`: an operation failed to establish its own guarantee.
///   Always a defect; never suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("postcondition violated: {0}")]
    Postcondition(String),
}

/// Discriminant of a [`Violation`], for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Precondition,
    Invariant,
    Postcondition,
}

impl Violation {
    pub fn precondition(message: impl Into<String>) -> Self {
        Violation::Precondition(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Violation::Invariant(message.into())
    }

    pub fn postcondition(message: impl Into<String>) -> Self {
        Violation::Postcondition(message.into())
    }

    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::Precondition(_) => ViolationKind::Precondition,
            Violation::Invariant(_) => ViolationKind::Invariant,
            Violation::Postcondition(_) => ViolationKind::Postcondition,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Violation::Precondition(m) | Violation::Invariant(m) | Violation::Postcondition(m) => m,
        }
    }
}

/// Reject a missing or blank string field.
pub fn require_non_blank<'a>(value: &'a str, field: &str) -> ContractResult<&'a str> {
    if value.trim().is_empty() {
        return Err(Violation::precondition(format!("{field} must not be blank")));
    }
    Ok(value)
}
