//! Parent-chain access for the attestation engine.
//!
//! This crate owns everything that touches the Bitcoin side of an
//! attestation cycle: the [`ParentChain`] RPC abstraction with its
//! `bitcoincore-rpc` implementation, the [`AttestFees`] controller, and
//! the [`AttestClient`] that derives addresses, builds and fee-bumps the
//! attestation transaction, signs it, and walks the subchain to locate
//! the live UTXO.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
mod config;
mod error;
pub mod fees;
pub mod mock;
pub mod rpc;

pub use client::{AttestClient, AttestConfig};
pub use config::RpcConfig;
pub use error::{BitcoinError, Result};
pub use fees::{AttestFees, FeeOracle, FeeType, FeesConfig, FixedFeeOracle, HttpFeeOracle};
pub use rpc::{BitcoinRpc, BlockInfo, ParentChain, RawTx, Unspent, WalletTx};

/// Depth cap for the iterative subchain walk.
pub const SUBCHAIN_WALK_LIMIT: usize = 100_000;
