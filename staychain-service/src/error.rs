//! Typed cycle errors and their classification.

use thiserror::Error;

use staychain_bitcoin::BitcoinError;
use staychain_signer::SignerError;
use staychain_store::StoreError;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// How the runner reacts to a failed state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retry the same state after backoff.
    Retry,
    /// Cycle-fatal; move to the error state and restart after backoff.
    Advance,
    /// Process-fatal; stop the service loudly.
    Fatal,
}

/// Errors surfaced by state transitions.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Neither a subchain unspent nor a recovery candidate exists.
    #[error("system uninitialised: no subchain unspent or mempool transaction")]
    Uninitialised,

    /// The subchain unspent disappeared mid-cycle.
    #[error("no subchain unspent found mid-cycle")]
    NoUnspent,

    /// The live unspent is not locked by the expected derived script.
    #[error("derived address mismatch: {0}")]
    AddressMismatch(String),

    /// Fee cap reached while the transaction is still unconfirmed or
    /// under-signed.
    #[error("fee cap reached with transaction still unconfirmed")]
    FeeCapReached,

    /// A mempool recovery candidate has no persisted record.
    #[error("unconfirmed transaction {0} has no stored attestation record")]
    MissingRecord(String),

    /// Internal state machine invariant broken.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Parent-chain failure.
    #[error("parent chain error: {0}")]
    Bitcoin(#[from] BitcoinError),

    /// Signer transport failure.
    #[error("signer transport error: {0}")]
    Signer(#[from] SignerError),

    /// Record store failure outside the broadcast window.
    #[error("record store error: {0}")]
    Store(StoreError),

    /// Record store failure after the transaction reached the network;
    /// the system must not silently lose an on-chain artifact.
    #[error("record store error after broadcast: {0}")]
    StoreAfterBroadcast(StoreError),

    /// Core model or crypto invariant violation.
    #[error(transparent)]
    Core(#[from] staychain_core::Error),
}

impl ServiceError {
    /// Classify for the runner.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Uninitialised => ErrorClass::Fatal,
            ServiceError::StoreAfterBroadcast(_) => ErrorClass::Fatal,

            ServiceError::Bitcoin(e) => match e {
                BitcoinError::RpcConnection(_)
                | BitcoinError::RpcCall(_)
                | BitcoinError::TxNotFound(_)
                | BitcoinError::BlockNotFound(_)
                | BitcoinError::FeeOracle(_) => ErrorClass::Retry,
                _ => ErrorClass::Advance,
            },
            ServiceError::Signer(_) => ErrorClass::Retry,
            ServiceError::Store(_) => ErrorClass::Retry,

            ServiceError::NoUnspent
            | ServiceError::AddressMismatch(_)
            | ServiceError::FeeCapReached
            | ServiceError::MissingRecord(_)
            | ServiceError::Internal(_)
            | ServiceError::Core(_) => ErrorClass::Advance,
        }
    }
}
