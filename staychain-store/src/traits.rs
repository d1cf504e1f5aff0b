//! Store traits.

use bitcoin::Txid;

use staychain_core::{
    AttestationInfo, ClientCommitment, CommitmentHash, MerkleCommitment, MerkleProof,
};

use crate::error::Result;

/// One persisted attestation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationRow {
    /// Attestation transaction id.
    pub txid: Txid,
    /// Merkle root anchored by the attestation.
    pub merkle_root: CommitmentHash,
    /// Whether the parent chain has confirmed the transaction.
    pub confirmed: bool,
}

/// Typed upserts and queries over the attestation records.
///
/// Implementations must provide linearisable single-key reads after
/// writes; the engine persists the unconfirmed row before broadcasting
/// and relies on reading it back during crash recovery.
pub trait RecordStore: Send + Sync {
    /// Upsert an attestation row, keyed by txid.
    fn save_attestation(&self, row: &AttestationRow) -> Result<()>;

    /// Merkle root of the most recently saved attestation, optionally
    /// restricted to confirmed rows.
    fn latest_attestation_merkle_root(&self, confirmed_only: bool)
        -> Result<Option<CommitmentHash>>;

    /// Persist confirmation info for an attestation.
    fn save_attestation_info(&self, info: &AttestationInfo) -> Result<()>;

    /// Upsert the merkle commitment rows of one attestation tree.
    fn save_merkle_commitments(&self, commitments: &[MerkleCommitment]) -> Result<()>;

    /// The merkle commitment rows of the attestation with this txid.
    fn attestation_merkle_commitments(&self, txid: &Txid) -> Result<Vec<MerkleCommitment>>;

    /// Upsert the merkle proofs of one attestation tree.
    fn save_merkle_proofs(&self, proofs: &[MerkleProof]) -> Result<()>;

    /// Latest client commitments, ordered by client position ascending.
    fn client_commitments(&self) -> Result<Vec<ClientCommitment>>;
}

impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn save_attestation(&self, row: &AttestationRow) -> Result<()> {
        (**self).save_attestation(row)
    }

    fn latest_attestation_merkle_root(
        &self,
        confirmed_only: bool,
    ) -> Result<Option<CommitmentHash>> {
        (**self).latest_attestation_merkle_root(confirmed_only)
    }

    fn save_attestation_info(&self, info: &AttestationInfo) -> Result<()> {
        (**self).save_attestation_info(info)
    }

    fn save_merkle_commitments(&self, commitments: &[MerkleCommitment]) -> Result<()> {
        (**self).save_merkle_commitments(commitments)
    }

    fn attestation_merkle_commitments(&self, txid: &Txid) -> Result<Vec<MerkleCommitment>> {
        (**self).attestation_merkle_commitments(txid)
    }

    fn save_merkle_proofs(&self, proofs: &[MerkleProof]) -> Result<()> {
        (**self).save_merkle_proofs(proofs)
    }

    fn client_commitments(&self) -> Result<Vec<ClientCommitment>> {
        (**self).client_commitments()
    }
}
