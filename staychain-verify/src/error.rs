//! Error types for staychain verification.

use thiserror::Error;

/// Result type for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Errors from fetching and verifying attestations.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Attestation transaction carries no outputs.
    #[error("attestation {0} has no outputs")]
    NoOutputs(String),

    /// No reported commitment re-derives the on-chain script.
    #[error("no commitment reproduces the output script of {0}")]
    ScriptMismatch(String),

    /// The reported leaves do not hash to the reported root.
    #[error("reported commitments do not match merkle root {0}")]
    RootMismatch(String),

    /// The configured client position is missing from the attestation.
    #[error("client position {0} missing from attestation commitments")]
    MissingPosition(u32),

    /// Attestation API failure: transport and non-success responses
    /// share this one failure mode.
    #[error("attestation API request failed: {0}")]
    Api(String),

    /// Client-chain lookup failure.
    #[error("client chain error: {0}")]
    ClientChain(String),

    /// Parent-chain failure.
    #[error("parent chain error: {0}")]
    Bitcoin(#[from] staychain_bitcoin::BitcoinError),

    /// Core model or crypto error.
    #[error(transparent)]
    Core(#[from] staychain_core::Error),
}
