//! Commitment model: a merkle tree over positional client commitments.
//!
//! Each attestation anchors a single 32-byte value. When more than one
//! client chain is attested, that value is the SHA-256d merkle root over
//! the client commitments ordered by client position. Positions are dense
//! starting at 0; a missing position carries the zero hash. Odd layers
//! duplicate the last node; a single-leaf tree's root is the leaf itself.

use bitcoin::hashes::{sha256d, Hash as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The 32-byte value anchored by one attestation.
///
/// Hex display follows the txid convention (byte-reversed).
pub type CommitmentHash = sha256d::Hash;

/// Hash a pair of nodes into their parent.
fn hash_pair(left: &CommitmentHash, right: &CommitmentHash) -> CommitmentHash {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(&left.to_byte_array());
    combined[32..].copy_from_slice(&right.to_byte_array());
    sha256d::Hash::hash(&combined)
}

/// A client commitment at a client position, as submitted to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommitment {
    /// Client position in the attestation tree.
    pub client_position: u32,
    /// The committed hash.
    pub commitment: CommitmentHash,
}

/// One leaf of an attestation's merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleCommitment {
    /// Root of the attestation tree this leaf belongs to.
    pub merkle_root: CommitmentHash,
    /// Client position of the leaf.
    pub client_position: u32,
    /// The committed hash at this position.
    pub commitment: CommitmentHash,
}

/// One sibling step of a merkle proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash combined with the running node.
    pub sibling: CommitmentHash,
    /// Whether the sibling sits on the left of the running node.
    pub is_left: bool,
}

/// Merkle proof for a single client position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Root of the attestation tree.
    pub merkle_root: CommitmentHash,
    /// Client position proven.
    pub client_position: u32,
    /// Leaf hash at the proven position.
    pub commitment: CommitmentHash,
    /// Ordered sibling steps from leaf to root.
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Fold the leaf up through the sibling steps, yielding the root the
    /// proof commits to.
    pub fn compute_root(&self) -> CommitmentHash {
        let mut current = self.commitment;
        for step in &self.steps {
            current = if step.is_left {
                hash_pair(&step.sibling, &current)
            } else {
                hash_pair(&current, &step.sibling)
            };
        }
        current
    }

    /// Check the proof against its recorded root.
    pub fn verify(&self) -> bool {
        self.compute_root() == self.merkle_root
    }
}

/// An immutable ordered sequence of client commitments with its merkle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    commitments: Vec<CommitmentHash>,
    // levels[0] holds the leaves, the last level holds the root alone
    levels: Vec<Vec<CommitmentHash>>,
}

impl Commitment {
    /// Build a commitment over the given positional hashes.
    ///
    /// The list must be non-empty; callers fill missing positions with the
    /// zero hash before constructing.
    pub fn new(commitments: Vec<CommitmentHash>) -> Result<Self> {
        if commitments.is_empty() {
            return Err(Error::CommitmentListEmpty);
        }
        let levels = build_levels(&commitments);
        Ok(Self {
            commitments,
            levels,
        })
    }

    /// The canonical merkle root anchored on the parent chain.
    pub fn root(&self) -> CommitmentHash {
        self.levels[self.levels.len() - 1][0]
    }

    /// The positional client commitments, dense from position 0.
    pub fn commitments(&self) -> &[CommitmentHash] {
        &self.commitments
    }

    /// One [`MerkleCommitment`] row per leaf.
    pub fn merkle_commitments(&self) -> Vec<MerkleCommitment> {
        let root = self.root();
        self.commitments
            .iter()
            .enumerate()
            .map(|(pos, commitment)| MerkleCommitment {
                merkle_root: root,
                client_position: pos as u32,
                commitment: *commitment,
            })
            .collect()
    }

    /// A [`MerkleProof`] per leaf.
    pub fn merkle_proofs(&self) -> Vec<MerkleProof> {
        (0..self.commitments.len())
            .map(|pos| self.proof(pos))
            .collect()
    }

    fn proof(&self, position: usize) -> MerkleProof {
        let mut steps = Vec::new();
        let mut index = position;

        // all levels but the root contribute one sibling each
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = index ^ 1;
            // odd layer: the last node pairs with its own duplicate
            let sibling = if sibling_index < level.len() {
                level[sibling_index]
            } else {
                level[index]
            };
            steps.push(ProofStep {
                sibling,
                is_left: index % 2 == 1,
            });
            index /= 2;
        }

        MerkleProof {
            merkle_root: self.root(),
            client_position: position as u32,
            commitment: self.commitments[position],
            steps,
        }
    }
}

/// Build the tree bottom-up, duplicating the last node at odd layers.
fn build_levels(leaves: &[CommitmentHash]) -> Vec<Vec<CommitmentHash>> {
    let mut levels = vec![leaves.to_vec()];
    while levels[levels.len() - 1].len() > 1 {
        let current = &levels[levels.len() - 1];
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        for pair in current.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(hash_pair(left, right));
        }
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash as _;
    use proptest::prelude::*;

    use super::*;

    fn hash(s: &str) -> CommitmentHash {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_commitment_rejected() {
        let err = Commitment::new(vec![]).unwrap_err();
        assert!(matches!(err, Error::CommitmentListEmpty));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let leaf = hash("1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7");
        let commitment = Commitment::new(vec![leaf]).unwrap();
        assert_eq!(commitment.root(), leaf);
    }

    #[test]
    fn test_three_leaf_root() {
        let commitment = Commitment::new(vec![
            hash("1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
            hash("2a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
            hash("3a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
        ])
        .unwrap();
        assert_eq!(
            commitment.root(),
            hash("bb088c106b3379b64243c1a4915f72a847d45c7513b152cad583eb3c0a1063c2")
        );
    }

    #[test]
    fn test_two_leaf_root_matches_pair_hash() {
        let a = hash("1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7");
        let b = hash("2a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7");
        let commitment = Commitment::new(vec![a, b]).unwrap();
        assert_eq!(commitment.root(), hash_pair(&a, &b));
    }

    #[test]
    fn test_merkle_commitment_rows() {
        let leaves = vec![
            hash("1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
            hash("2a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
        ];
        let commitment = Commitment::new(leaves.clone()).unwrap();
        let rows = commitment.merkle_commitments();
        assert_eq!(rows.len(), 2);
        for (pos, row) in rows.iter().enumerate() {
            assert_eq!(row.merkle_root, commitment.root());
            assert_eq!(row.client_position, pos as u32);
            assert_eq!(row.commitment, leaves[pos]);
        }
    }

    #[test]
    fn test_proofs_verify_for_every_position() {
        for n in 1..=9usize {
            let leaves: Vec<CommitmentHash> = (0..n)
                .map(|i| {
                    let mut bytes = [0u8; 32];
                    bytes[0] = i as u8 + 1;
                    CommitmentHash::from_byte_array(bytes)
                })
                .collect();
            let commitment = Commitment::new(leaves).unwrap();
            for proof in commitment.merkle_proofs() {
                assert!(proof.verify(), "proof failed for {} leaves", n);
                assert_eq!(proof.compute_root(), commitment.root());
            }
        }
    }

    proptest! {
        #[test]
        fn prop_every_proof_verifies(
            leaves in prop::collection::vec(any::<[u8; 32]>(), 1..24),
        ) {
            let hashes: Vec<CommitmentHash> =
                leaves.into_iter().map(CommitmentHash::from_byte_array).collect();
            let commitment = Commitment::new(hashes).unwrap();
            for proof in commitment.merkle_proofs() {
                prop_assert!(proof.verify());
                prop_assert_eq!(proof.compute_root(), commitment.root());
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let commitment = Commitment::new(vec![
            hash("1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
            hash("2a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
            hash("3a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"),
        ])
        .unwrap();
        let mut proof = commitment.merkle_proofs().remove(1);
        proof.commitment =
            hash("4444e34e881d9a1e6cdc3418b54bb57747106bc75e9e84426661f27f98ada3b7");
        assert!(!proof.verify());
    }
}
