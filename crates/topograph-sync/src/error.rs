//! Reconciliation error types.

use thiserror::Error;
use topograph_core::Violation;
use topograph_state::StateError;

/// Errors raised while validating, reconciling or retargeting.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Violation(#[from] Violation),

    #[error("state store error: {0}")]
    State(StateError),
}

/// Contract violations raised inside the store surface as
/// [`SyncError::Violation`], not as store failures.
impl From<StateError> for SyncError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Contract(violation) => SyncError::Violation(violation),
            other => SyncError::State(other),
        }
    }
}

impl SyncError {
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            SyncError::Violation(v) => Some(v),
            SyncError::State(_) => None,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
