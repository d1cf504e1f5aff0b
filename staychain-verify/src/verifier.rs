//! Attestation verification.

use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::{Address, BlockHash, Network, ScriptBuf};

use staychain_core::crypto::{create_multisig, parse_redeem_script, tweak_public_key};
use staychain_core::{Commitment, CommitmentHash};

use crate::api::CommitmentApi;
use crate::clientchain::{ClientBlock, ClientChain};
use crate::error::{Result, VerifyError};
use crate::fetcher::TxUpdate;

/// The outcome of verifying one staychain transaction.
#[derive(Debug, Clone)]
pub struct VerifiedAttestation {
    /// Parent-chain transaction id.
    pub txid: bitcoin::Txid,
    /// Parent-chain block containing the transaction.
    pub blockhash: Option<BlockHash>,
    /// The merkle root whose tweak reproduces the output script; `None`
    /// for the zero-tweak genesis script.
    pub merkle_root: Option<CommitmentHash>,
    /// The client-chain block anchored at the configured position.
    pub client_block: Option<ClientBlock>,
}

/// Verifier re-deriving attestation scripts from reported commitments.
pub struct ChainVerifier<C, A> {
    secp: Secp256k1<All>,
    network: Network,
    client_chain: C,
    api: A,
    client_position: u32,
    script0: ScriptBuf,
    genesis_script_pubkey: ScriptBuf,
    pubkeys: Vec<PublicKey>,
    num_of_sigs: usize,
}

impl<C: ClientChain, A: CommitmentApi> ChainVerifier<C, A> {
    /// Build a verifier from the initial redeem script and the client
    /// position to resolve.
    pub fn new(
        network: Network,
        client_chain: C,
        api: A,
        client_position: u32,
        script0: ScriptBuf,
    ) -> Result<Self> {
        let (pubkeys, num_of_sigs) = parse_redeem_script(&script0)?;
        let genesis_script_pubkey = Address::p2sh(&script0, network)
            .map_err(|e| VerifyError::Core(staychain_core::Error::InvalidAddress(e.to_string())))?
            .script_pubkey();
        Ok(Self {
            secp: Secp256k1::new(),
            network,
            client_chain,
            api,
            client_position,
            script0,
            genesis_script_pubkey,
            pubkeys,
            num_of_sigs,
        })
    }

    /// The initial redeem script.
    pub fn script0(&self) -> &ScriptBuf {
        &self.script0
    }

    /// The P2SH script for the initial pubkeys tweaked with a root.
    fn derive_script_pubkey(&self, root: &CommitmentHash) -> Result<ScriptBuf> {
        let tweaked: Vec<PublicKey> = self
            .pubkeys
            .iter()
            .map(|pk| tweak_public_key(&self.secp, pk, root))
            .collect::<staychain_core::Result<_>>()?;
        let (address, _) = create_multisig(&tweaked, self.num_of_sigs, self.network)?;
        Ok(address.script_pubkey())
    }

    /// Verify one staychain transaction: the reported commitments must
    /// re-derive its output script, and the leaf at the configured
    /// position must resolve to a client-chain block.
    pub async fn verify(&self, update: &TxUpdate) -> Result<VerifiedAttestation> {
        let script_pubkey = &update
            .tx
            .output
            .first()
            .ok_or_else(|| VerifyError::NoOutputs(update.txid.to_string()))?
            .script_pubkey;

        // zero tweak: the genesis script itself
        if *script_pubkey == self.genesis_script_pubkey {
            return Ok(VerifiedAttestation {
                txid: update.txid,
                blockhash: update.blockhash,
                merkle_root: None,
                client_block: None,
            });
        }

        let reported = self.api.attestation_commitments(&update.txid).await?;

        // the reported leaves must reproduce the reported root
        let mut leaves = match reported.commitments.iter().map(|c| c.client_position).max() {
            Some(max) => vec![CommitmentHash::all_zeros(); max as usize + 1],
            None => Vec::new(),
        };
        for commitment in &reported.commitments {
            leaves[commitment.client_position as usize] = commitment.commitment;
        }
        let tree = Commitment::new(leaves)?;
        if tree.root() != reported.merkle_root {
            return Err(VerifyError::RootMismatch(reported.merkle_root.to_string()));
        }

        // the root's tweak must reproduce the on-chain script
        let derived = self.derive_script_pubkey(&reported.merkle_root)?;
        if derived != *script_pubkey {
            return Err(VerifyError::ScriptMismatch(update.txid.to_string()));
        }

        // resolve the client-chain block anchored at our position
        let leaf = reported
            .commitments
            .iter()
            .find(|c| c.client_position == self.client_position)
            .ok_or(VerifyError::MissingPosition(self.client_position))?
            .commitment;
        let client_hash = BlockHash::from_raw_hash(leaf);
        let client_block = self.client_chain.block(&client_hash).await?;

        Ok(VerifiedAttestation {
            txid: update.txid,
            blockhash: update.blockhash,
            merkle_root: Some(reported.merkle_root),
            client_block: Some(client_block),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Transaction, TxOut, Txid};
    use parking_lot::Mutex;

    use staychain_core::ClientCommitment;

    use super::*;
    use crate::api::AttestationCommitments;

    struct MapApi {
        attestations: Mutex<HashMap<Txid, AttestationCommitments>>,
    }

    #[async_trait]
    impl CommitmentApi for MapApi {
        async fn attestation_commitments(&self, txid: &Txid) -> Result<AttestationCommitments> {
            self.attestations
                .lock()
                .get(txid)
                .cloned()
                .ok_or_else(|| VerifyError::Api(format!("unknown attestation {txid}")))
        }
    }

    struct MapClientChain {
        blocks: HashMap<BlockHash, ClientBlock>,
    }

    #[async_trait]
    impl ClientChain for MapClientChain {
        async fn best_block_hash(&self) -> Result<BlockHash> {
            self.blocks
                .values()
                .max_by_key(|b| b.height)
                .map(|b| b.hash)
                .ok_or_else(|| VerifyError::ClientChain("empty chain".into()))
        }

        async fn block(&self, hash: &BlockHash) -> Result<ClientBlock> {
            self.blocks
                .get(hash)
                .copied()
                .ok_or_else(|| VerifyError::ClientChain(format!("unknown block {hash}")))
        }
    }

    fn keypair(seed: u8) -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        let sk = SecretKey::from_slice(&bytes).unwrap();
        (sk, sk.public_key(&secp))
    }

    fn tx_paying(script_pubkey: ScriptBuf) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey,
            }],
        }
    }

    struct Setup {
        verifier: ChainVerifier<MapClientChain, Arc<MapApi>>,
        api: Arc<MapApi>,
        script0: ScriptBuf,
        client_hash: BlockHash,
        leaf: CommitmentHash,
    }

    fn setup() -> Setup {
        let pubkeys: Vec<PublicKey> = vec![keypair(1).1, keypair(2).1];
        let (_, script0) = create_multisig(&pubkeys, 2, Network::Regtest).unwrap();

        // the anchored leaf is a client-chain block hash
        let leaf: CommitmentHash =
            "1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"
                .parse()
                .unwrap();
        let client_hash = BlockHash::from_raw_hash(leaf);

        let api = Arc::new(MapApi {
            attestations: Mutex::new(HashMap::new()),
        });
        let client_chain = MapClientChain {
            blocks: HashMap::from([(
                client_hash,
                ClientBlock {
                    hash: client_hash,
                    height: 777,
                },
            )]),
        };

        let verifier = ChainVerifier::new(
            Network::Regtest,
            client_chain,
            Arc::clone(&api),
            0,
            script0.clone(),
        )
        .unwrap();

        Setup {
            verifier,
            api,
            script0,
            client_hash,
            leaf,
        }
    }

    #[tokio::test]
    async fn test_genesis_script_verifies_without_api() {
        let setup = setup();
        let genesis_spk = Address::p2sh(&setup.script0, Network::Regtest)
            .unwrap()
            .script_pubkey();
        let tx = tx_paying(genesis_spk);

        let update = TxUpdate {
            txid: tx.compute_txid(),
            tx,
            blockhash: None,
        };
        let verified = setup.verifier.verify(&update).await.unwrap();
        assert!(verified.merkle_root.is_none());
        assert!(verified.client_block.is_none());
    }

    #[tokio::test]
    async fn test_tweaked_script_resolves_client_block() {
        let setup = setup();
        let tree = Commitment::new(vec![setup.leaf]).unwrap();
        let root = tree.root();

        let script_pubkey = setup.verifier.derive_script_pubkey(&root).unwrap();
        let tx = tx_paying(script_pubkey);
        let txid = tx.compute_txid();

        setup.api.attestations.lock().insert(
            txid,
            AttestationCommitments {
                merkle_root: root,
                commitments: vec![ClientCommitment {
                    client_position: 0,
                    commitment: setup.leaf,
                }],
            },
        );

        let update = TxUpdate {
            txid,
            tx,
            blockhash: None,
        };
        let verified = setup.verifier.verify(&update).await.unwrap();
        assert_eq!(verified.merkle_root, Some(root));
        let client_block = verified.client_block.unwrap();
        assert_eq!(client_block.hash, setup.client_hash);
        assert_eq!(client_block.height, 777);
    }

    #[tokio::test]
    async fn test_mismatched_script_rejected() {
        let setup = setup();
        let tree = Commitment::new(vec![setup.leaf]).unwrap();
        let root = tree.root();

        // on-chain script derives from a different commitment
        let other: CommitmentHash =
            "2a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"
                .parse()
                .unwrap();
        let script_pubkey = setup.verifier.derive_script_pubkey(&other).unwrap();
        let tx = tx_paying(script_pubkey);
        let txid = tx.compute_txid();

        setup.api.attestations.lock().insert(
            txid,
            AttestationCommitments {
                merkle_root: root,
                commitments: vec![ClientCommitment {
                    client_position: 0,
                    commitment: setup.leaf,
                }],
            },
        );

        let update = TxUpdate {
            txid,
            tx,
            blockhash: None,
        };
        assert!(matches!(
            setup.verifier.verify(&update).await,
            Err(VerifyError::ScriptMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_root_rejected() {
        let setup = setup();
        let bogus_root: CommitmentHash =
            "3a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"
                .parse()
                .unwrap();
        let script_pubkey = setup.verifier.derive_script_pubkey(&bogus_root).unwrap();
        let tx = tx_paying(script_pubkey);
        let txid = tx.compute_txid();

        // leaves do not hash to the claimed root
        setup.api.attestations.lock().insert(
            txid,
            AttestationCommitments {
                merkle_root: bogus_root,
                commitments: vec![ClientCommitment {
                    client_position: 0,
                    commitment: setup.leaf,
                }],
            },
        );

        let update = TxUpdate {
            txid,
            tx,
            blockhash: None,
        };
        assert!(matches!(
            setup.verifier.verify(&update).await,
            Err(VerifyError::RootMismatch(_))
        ));
    }
}
