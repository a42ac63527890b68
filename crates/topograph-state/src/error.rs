//! Error types for the Topograph graph store.

use thiserror::Error;
use topograph_core::Violation;

/// Result type alias for graph store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during graph store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("corrupt edge key: {0}")]
    CorruptEdge(String),

    /// A stored record or query argument broke a domain contract.
    #[error(transparent)]
    Contract(#[from] Violation),
}
