//! Error types for core models and crypto.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by commitment, attestation and crypto operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Commitment construction from an empty list.
    #[error("commitment list empty")]
    CommitmentListEmpty,

    /// Attestation carries no commitment.
    #[error("commitment not defined")]
    CommitmentNotDefined,

    /// Attestation info set more than once.
    #[error("attestation already confirmed")]
    AlreadyConfirmed,

    /// Redeem script does not match the canonical multisig layout.
    #[error("invalid redeem script: {0}")]
    InvalidRedeemScript(String),

    /// Multisig parameters out of range.
    #[error("invalid multisig: {0} of {1}")]
    InvalidMultisig(usize, usize),

    /// Signature script does not parse as an M-of-N P2SH spend.
    #[error("invalid signature script: {0}")]
    InvalidScriptSig(String),

    /// Tweak scalar out of range for the secp256k1 group order.
    #[error("invalid tweak scalar")]
    InvalidTweak,

    /// Invalid private key material.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Script too large for a P2SH output.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// secp256k1 arithmetic failure (zero key, point at infinity).
    #[error("secp256k1 error: {0}")]
    Secp(#[from] bitcoin::secp256k1::Error),
}
