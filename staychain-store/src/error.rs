//! Error types for the record store.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from record persistence and retrieval.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend write failure.
    #[error("store write failed: {0}")]
    Write(String),

    /// Backend read failure.
    #[error("store read failed: {0}")]
    Read(String),

    /// Info saved for an attestation that was never stored.
    #[error("unknown attestation: {0}")]
    UnknownAttestation(String),

    /// Core model error surfaced while assembling records.
    #[error(transparent)]
    Core(#[from] staychain_core::Error),
}
