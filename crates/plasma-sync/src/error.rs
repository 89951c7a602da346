//! Error types for the sync layer.

use plasma_chain::ChainError;
use plasma_providers::ProviderError;
use plasma_state::StateError;
use thiserror::Error;

/// Sync layer errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An anchor event is missing or carries a malformed field.
    #[error("Malformed event {event}: {message}")]
    MalformedEvent { event: String, message: String },

    /// Chain layer error.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// State engine error.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
