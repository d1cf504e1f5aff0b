//! Offline staychain verification.
//!
//! Given the genesis transaction and the initial redeem script, the
//! [`ChainFetcher`] follows spending transactions forward through the
//! parent chain and the [`ChainVerifier`] re-derives each attestation
//! address from the commitments reported by the attestation API,
//! confirming that the on-chain script matches and resolving the client
//! chain block each attestation anchors.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod api;
mod clientchain;
mod error;
mod fetcher;
mod verifier;

pub use api::{AttestationCommitments, CommitmentApi, HttpCommitmentApi};
pub use clientchain::{ClientBlock, ClientChain};
pub use error::{Result, VerifyError};
pub use fetcher::{ChainFetcher, TxUpdate};
pub use verifier::{ChainVerifier, VerifiedAttestation};
