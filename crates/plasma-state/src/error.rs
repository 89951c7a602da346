//! Error types for state management.

use thiserror::Error;

/// State engine errors.
#[derive(Error, Debug)]
pub enum StateError {
    /// A range with `start >= end` was rejected.
    #[error("Invalid range: start {start} >= end {end}")]
    InvalidRange { start: String, end: String },

    /// A state object violated a structural invariant.
    #[error("Invalid state object: {0}")]
    InvalidStateObject(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
