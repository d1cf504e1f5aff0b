//! Error types for the signer transport.

use thiserror::Error;

/// Result type for signer transport operations.
pub type Result<T> = std::result::Result<T, SignerError>;

/// Errors from framing and socket handling.
#[derive(Debug, Error)]
pub enum SignerError {
    /// A chunk exceeds the one-byte length prefix.
    #[error("chunk length {0} exceeds 255 bytes")]
    ChunkTooLong(usize),

    /// Socket bind failure.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// Address the publisher tried to bind.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Peer connection failure.
    #[error("connect failed to {addr}: {source}")]
    Connect {
        /// Peer address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Write to a peer failed.
    #[error("publish failed: {0}")]
    Publish(std::io::Error),
}
