//! Engine-facing record server.

use bitcoin::hashes::Hash as _;
use bitcoin::Txid;

use staychain_core::{Attestation, Commitment, CommitmentHash};

use crate::error::Result;
use crate::traits::{AttestationRow, RecordStore};

/// Facade over a [`RecordStore`] providing the operations the
/// attestation engine drives a cycle with.
pub struct RecordServer<D> {
    db: D,
}

impl<D: RecordStore> RecordServer<D> {
    /// Wrap a store.
    pub fn new(db: D) -> Self {
        Self { db }
    }

    /// The underlying store.
    pub fn db(&self) -> &D {
        &self.db
    }

    /// Persist an attestation: the row, its merkle commitments and
    /// proofs, then the info block once confirmed. This runs before
    /// broadcast for unconfirmed records so a crash between persist and
    /// broadcast stays recoverable.
    pub fn update_latest_attestation(&self, attestation: &Attestation) -> Result<()> {
        let commitment = attestation.commitment()?;
        self.db.save_attestation(&AttestationRow {
            txid: attestation.txid,
            merkle_root: commitment.root(),
            confirmed: attestation.confirmed,
        })?;
        self.db
            .save_merkle_commitments(&commitment.merkle_commitments())?;
        self.db.save_merkle_proofs(&commitment.merkle_proofs())?;

        if attestation.confirmed {
            self.db.save_attestation_info(&attestation.info)?;
        }
        Ok(())
    }

    /// Commitment hash of the latest confirmed attestation; the zero
    /// hash when none exists yet.
    pub fn latest_confirmed_commitment_hash(&self) -> Result<CommitmentHash> {
        Ok(self
            .db
            .latest_attestation_merkle_root(true)?
            .unwrap_or_else(CommitmentHash::all_zeros))
    }

    /// Commitment hash of the latest attestation regardless of
    /// confirmation; the zero hash when none exists yet.
    pub fn latest_commitment_hash(&self) -> Result<CommitmentHash> {
        Ok(self
            .db
            .latest_attestation_merkle_root(false)?
            .unwrap_or_else(CommitmentHash::all_zeros))
    }

    /// Assemble the current client commitment from the stored positional
    /// rows. Positions are dense from zero; missing positions carry the
    /// zero hash. Errors when no client commitments exist yet.
    pub fn client_commitment(&self) -> Result<Commitment> {
        let rows = self.db.client_commitments()?;

        let mut hashes = match rows.last() {
            // rows are ordered ascending, the last holds the max position
            Some(last) => vec![CommitmentHash::all_zeros(); last.client_position as usize + 1],
            None => Vec::new(),
        };
        for row in &rows {
            hashes[row.client_position as usize] = row.commitment;
        }

        Ok(Commitment::new(hashes)?)
    }

    /// The commitment anchored by a given attestation transaction, or
    /// `None` when the store has no rows for it (the genesis case).
    pub fn attestation_commitment(&self, txid: &Txid) -> Result<Option<Commitment>> {
        let rows = self.db.attestation_merkle_commitments(txid)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut rows = rows;
        rows.sort_by_key(|c| c.client_position);
        let hashes = rows.iter().map(|c| c.commitment).collect();
        Ok(Some(Commitment::new(hashes)?))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash as _;

    use staychain_core::Error as CoreError;

    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryStore;

    fn hash(byte: u8) -> CommitmentHash {
        CommitmentHash::from_byte_array([byte; 32])
    }

    fn txid(byte: u8) -> Txid {
        Txid::from_byte_array([byte; 32])
    }

    #[test]
    fn test_client_commitment_dense_assembly() {
        let server = RecordServer::new(MemoryStore::new());
        server.db().set_client_commitment(0, hash(0xC0));
        server.db().set_client_commitment(2, hash(0xC2));

        let commitment = server.client_commitment().unwrap();
        let hashes = commitment.commitments();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0], hash(0xC0));
        assert_eq!(hashes[1], CommitmentHash::all_zeros());
        assert_eq!(hashes[2], hash(0xC2));
    }

    #[test]
    fn test_client_commitment_empty_store_errors() {
        let server = RecordServer::new(MemoryStore::new());
        assert!(matches!(
            server.client_commitment(),
            Err(StoreError::Core(CoreError::CommitmentListEmpty))
        ));
    }

    #[test]
    fn test_update_and_lookup_roundtrip() {
        let server = RecordServer::new(MemoryStore::new());
        let commitment = Commitment::new(vec![hash(0xC0), hash(0xC1)]).unwrap();
        let root = commitment.root();
        let attestation = Attestation::new(txid(1), commitment);

        server.update_latest_attestation(&attestation).unwrap();

        // unconfirmed row visible through the unconfirmed query only
        assert_eq!(server.latest_commitment_hash().unwrap(), root);
        assert_eq!(
            server.latest_confirmed_commitment_hash().unwrap(),
            CommitmentHash::all_zeros()
        );

        let restored = server.attestation_commitment(&txid(1)).unwrap().unwrap();
        assert_eq!(restored.root(), root);

        assert!(server.attestation_commitment(&txid(9)).unwrap().is_none());
    }

    #[test]
    fn test_confirmed_attestation_persists_info() {
        use bitcoin::BlockHash;

        let server = RecordServer::new(MemoryStore::new());
        let commitment = Commitment::new(vec![hash(0xC0)]).unwrap();
        let root = commitment.root();
        let mut attestation = Attestation::new(txid(1), commitment);
        server.update_latest_attestation(&attestation).unwrap();

        attestation
            .mark_confirmed(BlockHash::from_byte_array([0xB0; 32]), 1_542_121_293, 99)
            .unwrap();
        server.update_latest_attestation(&attestation).unwrap();

        assert_eq!(server.latest_confirmed_commitment_hash().unwrap(), root);
    }
}
