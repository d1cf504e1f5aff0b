//! Core types for staychain attestations.
//!
//! A staychain anchors the state of one or more client chains into Bitcoin
//! by repeatedly spending a single dedicated UTXO whose locking script is
//! tweaked with the commitment being anchored. This crate holds the pieces
//! everything else is built from:
//!
//! - the [`Commitment`] merkle model over positional client commitments,
//!   with per-leaf [`MerkleProof`]s,
//! - the [`Attestation`] record and its confirmation lifecycle,
//! - the key-tweaking and script-assembly primitives in [`crypto`],
//! - the [`SigningKey`] secret wrapper.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod attestation;
pub mod commitment;
pub mod crypto;
mod error;
mod secret;

pub use attestation::{Attestation, AttestationInfo};
pub use commitment::{
    ClientCommitment, Commitment, CommitmentHash, MerkleCommitment, MerkleProof, ProofStep,
};
pub use error::{Error, Result};
pub use secret::SigningKey;

/// Maximum number of keys in an attestation multisig.
pub const MAX_MULTISIG_KEYS: usize = 15;
