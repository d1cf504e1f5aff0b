//! In-memory record store.

use std::collections::HashMap;

use bitcoin::Txid;
use parking_lot::RwLock;

use staychain_core::{
    AttestationInfo, ClientCommitment, CommitmentHash, MerkleCommitment, MerkleProof,
};

use crate::error::{Result, StoreError};
use crate::traits::{AttestationRow, RecordStore};

#[derive(Default)]
struct Inner {
    // insertion-ordered; the engine is the single writer
    attestations: Vec<AttestationRow>,
    infos: HashMap<Txid, AttestationInfo>,
    merkle_commitments: HashMap<CommitmentHash, Vec<MerkleCommitment>>,
    merkle_proofs: HashMap<CommitmentHash, Vec<MerkleProof>>,
    client_commitments: HashMap<u32, CommitmentHash>,
}

/// Process-local store with linearisable read-after-write.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// New empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client commitment at a position, replacing any previous
    /// value. This is the ingestion side the submission endpoint feeds.
    pub fn set_client_commitment(&self, position: u32, commitment: CommitmentHash) {
        self.inner
            .write()
            .client_commitments
            .insert(position, commitment);
    }
}

impl RecordStore for MemoryStore {
    fn save_attestation(&self, row: &AttestationRow) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .attestations
            .iter_mut()
            .find(|a| a.txid == row.txid)
        {
            *existing = *row;
        } else {
            inner.attestations.push(*row);
        }
        Ok(())
    }

    fn latest_attestation_merkle_root(
        &self,
        confirmed_only: bool,
    ) -> Result<Option<CommitmentHash>> {
        let inner = self.inner.read();
        Ok(inner
            .attestations
            .iter()
            .rev()
            .find(|a| !confirmed_only || a.confirmed)
            .map(|a| a.merkle_root))
    }

    fn save_attestation_info(&self, info: &AttestationInfo) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.attestations.iter().any(|a| a.txid == info.txid) {
            return Err(StoreError::UnknownAttestation(info.txid.to_string()));
        }
        inner.infos.insert(info.txid, *info);
        Ok(())
    }

    fn save_merkle_commitments(&self, commitments: &[MerkleCommitment]) -> Result<()> {
        let mut inner = self.inner.write();
        for commitment in commitments {
            let rows = inner
                .merkle_commitments
                .entry(commitment.merkle_root)
                .or_default();
            if let Some(existing) = rows
                .iter_mut()
                .find(|c| c.client_position == commitment.client_position)
            {
                *existing = *commitment;
            } else {
                rows.push(*commitment);
            }
        }
        Ok(())
    }

    fn attestation_merkle_commitments(&self, txid: &Txid) -> Result<Vec<MerkleCommitment>> {
        let inner = self.inner.read();
        let Some(row) = inner.attestations.iter().find(|a| a.txid == *txid) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .merkle_commitments
            .get(&row.merkle_root)
            .cloned()
            .unwrap_or_default())
    }

    fn save_merkle_proofs(&self, proofs: &[MerkleProof]) -> Result<()> {
        let mut inner = self.inner.write();
        for proof in proofs {
            let rows = inner.merkle_proofs.entry(proof.merkle_root).or_default();
            if let Some(existing) = rows
                .iter_mut()
                .find(|p| p.client_position == proof.client_position)
            {
                *existing = proof.clone();
            } else {
                rows.push(proof.clone());
            }
        }
        Ok(())
    }

    fn client_commitments(&self) -> Result<Vec<ClientCommitment>> {
        let inner = self.inner.read();
        let mut commitments: Vec<ClientCommitment> = inner
            .client_commitments
            .iter()
            .map(|(position, commitment)| ClientCommitment {
                client_position: *position,
                commitment: *commitment,
            })
            .collect();
        commitments.sort_by_key(|c| c.client_position);
        Ok(commitments)
    }
}
