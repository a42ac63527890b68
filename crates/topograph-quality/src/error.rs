//! Quality gate error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QualityError {
    #[error("state store error: {0}")]
    State(#[from] topograph_state::StateError),

    #[error("evaluation task failed: {0}")]
    Task(String),
}

pub type QualityResult<T> = Result<T, QualityError>;
