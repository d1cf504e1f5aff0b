//! Error types for parent-chain access.

use thiserror::Error;

/// Result type for parent-chain operations.
pub type Result<T> = std::result::Result<T, BitcoinError>;

/// Errors from RPC access, fee control and attestation building.
#[derive(Debug, Error)]
pub enum BitcoinError {
    /// RPC connection failure.
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    /// RPC call failure (transport or node-side).
    #[error("RPC call failed: {0}")]
    RpcCall(String),

    /// Transaction not known to the node.
    #[error("transaction not found: {0}")]
    TxNotFound(String),

    /// Block not known to the node.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// No subchain unspent available to build on.
    #[error("no subchain unspent found")]
    NoUnspent,

    /// Unspent amount does not cover the fee.
    #[error("insufficient funds: need {need} sat, have {have} sat")]
    InsufficientFunds {
        /// Satoshis required.
        need: u64,
        /// Satoshis available.
        have: u64,
    },

    /// Transaction building failure.
    #[error("transaction building failed: {0}")]
    TxBuild(String),

    /// Broadcast rejected by the node.
    #[error("transaction broadcast failed: {0}")]
    Broadcast(String),

    /// Signer key missing or not part of the attestation script.
    #[error("signing key error: {0}")]
    SigningKey(String),

    /// Subchain walk exceeded the depth cap.
    #[error("subchain walk exceeded {0} transactions")]
    WalkDepthExceeded(usize),

    /// Fee oracle request failure.
    #[error("fee oracle request failed: {0}")]
    FeeOracle(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Sighash computation failure.
    #[error("sighash error: {0}")]
    Sighash(String),

    /// Core model or crypto error.
    #[error(transparent)]
    Core(#[from] staychain_core::Error),
}

impl From<bitcoincore_rpc::Error> for BitcoinError {
    fn from(e: bitcoincore_rpc::Error) -> Self {
        // code -5 is the node's "not found" for tx and block lookups
        if let bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(ref rpc)) = e {
            if rpc.code == -5 {
                return BitcoinError::TxNotFound(rpc.message.clone());
            }
        }
        BitcoinError::RpcCall(e.to_string())
    }
}
