//! Error types for provider clients.

use thiserror::Error;

/// Provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The anchor chain endpoint is unreachable.
    #[error("Anchor chain is offline")]
    AnchorOffline,

    /// The operator endpoint is unreachable.
    #[error("Operator is offline")]
    OperatorOffline,

    /// A queried entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider variant does not support this operation.
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// Malformed request data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
