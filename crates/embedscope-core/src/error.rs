//! Engine error types

use thiserror::Error;

/// Errors that can occur in the exploration engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExploreError {
    /// Malformed or empty input (empty corpus, ragged matrix, bad parameter)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Vector length disagreement
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Bad focal or point index
    #[error("index {index} out of range for corpus of {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    /// Projection coordinates read before a reduction completed
    #[error("projection not ready")]
    NotReady,

    /// Iterative reduction stopped by the caller. Not a failure: the
    /// previous Ready projection stays valid.
    #[error("reduction cancelled")]
    Cancelled,

    /// Opaque pass-through from an external embedding provider
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// Result type for engine operations
pub type ExploreResult<T> = Result<T, ExploreError>;
