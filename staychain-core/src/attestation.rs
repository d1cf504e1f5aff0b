//! Attestation record and confirmation lifecycle.

use bitcoin::hashes::Hash as _;
use bitcoin::{BlockHash, Txid};
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, CommitmentHash};
use crate::error::{Error, Result};

/// Confirmation metadata, populated once the parent chain reports the
/// attestation transaction in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationInfo {
    /// Attestation transaction id.
    pub txid: Txid,
    /// Parent-chain block containing the transaction.
    pub blockhash: BlockHash,
    /// Value of the attestation output in satoshis.
    pub amount: i64,
    /// Block time reported by the parent chain.
    pub time: i64,
}

impl Default for AttestationInfo {
    fn default() -> Self {
        Self {
            txid: Txid::all_zeros(),
            blockhash: BlockHash::all_zeros(),
            amount: 0,
            time: 0,
        }
    }
}

/// A single parent-chain attestation of one commitment.
///
/// Created unconfirmed when a new transaction is broadcast; transitions to
/// confirmed exactly once, and is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    /// Parent-chain transaction id anchoring the commitment.
    pub txid: Txid,
    /// Confirmation state.
    pub confirmed: bool,
    /// Confirmation metadata, meaningful only when `confirmed`.
    pub info: AttestationInfo,
    commitment: Option<Commitment>,
}

impl Attestation {
    /// New unconfirmed attestation for a commitment.
    pub fn new(txid: Txid, commitment: Commitment) -> Self {
        Self {
            txid,
            confirmed: false,
            info: AttestationInfo::default(),
            commitment: Some(commitment),
        }
    }

    /// The designated "no attestation yet" record: zero txid, no
    /// commitment. Constructed confirmed so the first cycle can compare
    /// its commitment hash against the latest client commitment directly.
    pub fn default_genesis() -> Self {
        Self {
            txid: Txid::all_zeros(),
            confirmed: true,
            info: AttestationInfo::default(),
            commitment: None,
        }
    }

    /// The attested commitment.
    pub fn commitment(&self) -> Result<&Commitment> {
        self.commitment.as_ref().ok_or(Error::CommitmentNotDefined)
    }

    /// Replace the commitment on a record under construction.
    pub fn set_commitment(&mut self, commitment: Commitment) {
        self.commitment = Some(commitment);
    }

    /// The anchored hash: the commitment's merkle root, or the zero hash
    /// when no commitment is defined.
    pub fn commitment_hash(&self) -> CommitmentHash {
        match &self.commitment {
            Some(commitment) => commitment.root(),
            None => CommitmentHash::all_zeros(),
        }
    }

    /// Mark confirmed, recording block metadata. Errors if already
    /// confirmed; the transition happens exactly once.
    pub fn mark_confirmed(&mut self, blockhash: BlockHash, time: i64, amount: i64) -> Result<()> {
        if self.confirmed {
            return Err(Error::AlreadyConfirmed);
        }
        self.confirmed = true;
        self.info = AttestationInfo {
            txid: self.txid,
            blockhash,
            amount,
            time,
        };
        Ok(())
    }
}
