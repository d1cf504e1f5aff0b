//! The attest client: derivation, transaction building and signing.
//!
//! Holds the initial txid and redeem script the staychain was set up
//! with, derives the next attestation address by tweaking the initial
//! keys with the commitment being anchored, assembles and fee-bumps the
//! one-in/one-out attestation transaction, and walks spending history to
//! locate the live subchain UTXO among the wallet's unspents.
//!
//! When constructed with a signing key the client is also a co-signer:
//! it produces its own signature before combining peer signatures. A
//! client without a key can only be used with a multisig script.

use std::sync::Arc;

use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::{Builder, PushBytesBuf};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, EcdsaSighashType, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use tracing::info;

use staychain_core::crypto::{
    create_multisig, create_script_sig, parse_redeem_script, tweak_public_key, Sig,
};
use staychain_core::{CommitmentHash, SigningKey};

use crate::error::{BitcoinError, Result};
use crate::fees::AttestFees;
use crate::rpc::{ParentChain, Unspent};
use crate::SUBCHAIN_WALK_LIMIT;

/// Initial staychain parameters for an attest client.
#[derive(Debug)]
pub struct AttestConfig {
    /// Genesis attestation transaction id.
    pub init_txid: Txid,
    /// Initial multisig redeem script; `None` for single-key operation.
    pub multisig_script: Option<ScriptBuf>,
    /// This node's signing key; required when no multisig is used.
    pub signing_key: Option<SigningKey>,
    /// Parent-chain network.
    pub network: Network,
}

/// Client for deriving, building and signing attestation transactions.
pub struct AttestClient<P> {
    chain: Arc<P>,
    fees: AttestFees,
    network: Network,
    txid0: Txid,
    script0: Option<ScriptBuf>,
    pubkeys: Vec<PublicKey>,
    num_of_sigs: usize,
    wallet_key: Option<SigningKey>,
    secp: Secp256k1<All>,
}

impl<P: ParentChain> AttestClient<P> {
    /// Build a client from the initial staychain parameters.
    ///
    /// In the signer case the wallet key is imported into the node so the
    /// genesis unspent is watched; a multisig signer's key must be one of
    /// the script's pubkeys.
    pub fn new(chain: Arc<P>, fees: AttestFees, config: AttestConfig) -> Result<Self> {
        let secp = Secp256k1::new();

        let (pubkeys, num_of_sigs) = match &config.multisig_script {
            Some(script) => parse_redeem_script(script)?,
            None => (Vec::new(), 1),
        };

        if let Some(key) = &config.signing_key {
            if !pubkeys.is_empty() {
                let own = key.public_key(&secp);
                if !pubkeys.contains(&own) {
                    return Err(BitcoinError::SigningKey(
                        "client key missing from multisig script".into(),
                    ));
                }
            }
            chain.import_priv_key(key.as_priv(), "init")?;
        } else if config.multisig_script.is_none() {
            return Err(BitcoinError::SigningKey(
                "no multisig used, client must hold the signing key".into(),
            ));
        }

        Ok(Self {
            chain,
            fees,
            network: config.network,
            txid0: config.init_txid,
            script0: config.multisig_script,
            pubkeys,
            num_of_sigs,
            wallet_key: config.signing_key,
            secp,
        })
    }

    /// Genesis transaction id.
    pub fn init_txid(&self) -> Txid {
        self.txid0
    }

    /// Required signature count.
    pub fn num_of_sigs(&self) -> usize {
        self.num_of_sigs
    }

    /// Whether this client holds a signing key.
    pub fn is_signer(&self) -> bool {
        self.wallet_key.is_some()
    }

    /// The fee controller.
    pub fn fees(&self) -> &AttestFees {
        &self.fees
    }

    /// Mutable fee controller, for resets driven by the cycle.
    pub fn fees_mut(&mut self) -> &mut AttestFees {
        &mut self.fees
    }

    /// The signing key tweaked for a commitment; `None` when this client
    /// is not a signer. The zero hash maps to the untweaked genesis key.
    pub fn key_for_commitment(&self, hash: &CommitmentHash) -> Result<Option<SigningKey>> {
        match &self.wallet_key {
            None => Ok(None),
            Some(key) if hash == &CommitmentHash::all_zeros() => Ok(Some(key.clone())),
            Some(key) => Ok(Some(key.tweaked(hash)?)),
        }
    }

    /// The redeem script tweaked for a commitment; `None` in the
    /// single-key case. The zero hash maps to the genesis script.
    pub fn script_for_commitment(&self, hash: &CommitmentHash) -> Result<Option<ScriptBuf>> {
        let script0 = match &self.script0 {
            Some(script) => script,
            None => return Ok(None),
        };
        if hash == &CommitmentHash::all_zeros() {
            return Ok(Some(script0.clone()));
        }
        let tweaked: Vec<PublicKey> = self
            .pubkeys
            .iter()
            .map(|pk| tweak_public_key(&self.secp, pk, hash))
            .collect::<staychain_core::Result<_>>()?;
        let (_, script) = create_multisig(&tweaked, self.num_of_sigs, self.network)?;
        Ok(Some(script))
    }

    /// The key that will sign the next attestation, tweaked with the
    /// commitment being anchored; `None` when this client only derives
    /// addresses.
    pub fn next_attestation_key(&self, hash: &CommitmentHash) -> Result<Option<SigningKey>> {
        self.key_for_commitment(hash)
    }

    /// Derive the next attestation address for a commitment, together
    /// with its redeem script in the multisig case.
    pub fn next_attestation_addr(
        &self,
        hash: &CommitmentHash,
    ) -> Result<(Address, Option<ScriptBuf>)> {
        if let Some(script) = self.script_for_commitment(hash)? {
            let address = Address::p2sh(&script, self.network)
                .map_err(|e| BitcoinError::TxBuild(e.to_string()))?;
            return Ok((address, Some(script)));
        }

        let key = self
            .key_for_commitment(hash)?
            .ok_or_else(|| BitcoinError::SigningKey("no key for single-key derivation".into()))?;
        let address =
            staychain_core::crypto::p2pkh_address(&key.public_key(&self.secp), self.network);
        Ok((address, None))
    }

    /// Import a derived address so the node watches its unspents and
    /// mempool entries.
    pub fn import_attestation_addr(&self, address: &Address) -> Result<()> {
        self.chain.import_address(address)
    }

    /// Build the unsigned attestation transaction spending the current
    /// unspent to `address` for the full amount minus the size-based fee.
    /// The input opts into replace-by-fee.
    pub fn create_attestation(&self, address: &Address, unspent: &Unspent) -> Result<Transaction> {
        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: unspent.txid,
                    vout: unspent.vout,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: unspent.amount,
                script_pubkey: address.script_pubkey(),
            }],
        };

        let fee = self.fees.current() * tx.total_size() as u64;
        let have = unspent.amount.to_sat();
        if fee >= have {
            return Err(BitcoinError::InsufficientFunds { need: fee, have });
        }
        tx.output[0].value = unspent.amount - bitcoin::Amount::from_sat(fee);

        Ok(tx)
    }

    /// Bump the fee of an existing attestation transaction: clear any
    /// signatures, raise the controller, subtract the incremental fee.
    /// Inputs are never rebuilt.
    pub fn bump_attestation_fees(&mut self, tx: &mut Transaction) -> Result<()> {
        tx.input[0].script_sig = ScriptBuf::new();

        let prev_fee = self.fees.current();
        self.fees.bump();
        let increment = (self.fees.current() - prev_fee) * tx.total_size() as u64;

        let value = tx.output[0].value.to_sat();
        if increment >= value {
            return Err(BitcoinError::InsufficientFunds {
                need: increment,
                have: value,
            });
        }
        tx.output[0].value = bitcoin::Amount::from_sat(value - increment);

        Ok(())
    }

    /// The script the spent output commits to: the tweaked redeem script
    /// in the multisig case, the previous output's own script otherwise.
    fn spend_script(&self, hash: &CommitmentHash, tx: &Transaction) -> Result<ScriptBuf> {
        if let Some(redeem) = self.script_for_commitment(hash)? {
            return Ok(redeem);
        }
        let prev = tx.input[0].previous_output;
        let prev_tx = self.chain.raw_transaction(&prev.txid)?;
        let prev_out = prev_tx
            .output
            .get(prev.vout as usize)
            .ok_or_else(|| BitcoinError::TxBuild("previous output missing".into()))?;
        Ok(prev_out.script_pubkey.clone())
    }

    /// Sign the single input with the key derived from the previous
    /// confirmed commitment, producing a DER SIGHASH_ALL signature.
    pub fn sign_transaction(&self, hash: &CommitmentHash, tx: &Transaction) -> Result<Sig> {
        let key = self
            .key_for_commitment(hash)?
            .ok_or_else(|| BitcoinError::SigningKey("client is not a signer".into()))?;
        let script_code = self.spend_script(hash, tx)?;

        let sighash = SighashCache::new(tx)
            .legacy_signature_hash(0, &script_code, EcdsaSighashType::All.to_u32())
            .map_err(|e| BitcoinError::Sighash(e.to_string()))?;
        let message = Message::from_digest(sighash.to_byte_array());
        let signature = self.secp.sign_ecdsa(&message, &key.as_priv().inner);

        let mut sig = signature.serialize_der().to_vec();
        sig.push(EcdsaSighashType::All.to_u32() as u8);
        Ok(sig)
    }

    /// Combine the local signature (signer case) with peer signatures and
    /// finalise the scriptSig once at least M signatures are available.
    ///
    /// Returns the transaction together with the number of signatures
    /// gathered; below M the transaction is returned partially signed.
    pub fn sign_attestation(
        &self,
        tx: &Transaction,
        peer_sigs: &[Sig],
        hash: &CommitmentHash,
    ) -> Result<(Transaction, usize)> {
        let mut signed = tx.clone();
        let mut sigs: Vec<Sig> = Vec::new();
        if self.is_signer() {
            sigs.push(self.sign_transaction(hash, &signed)?);
        }

        match self.script_for_commitment(hash)? {
            Some(redeem) => {
                sigs.extend(peer_sigs.iter().cloned());
                let count = sigs.len();
                if count >= self.num_of_sigs {
                    signed.input[0].script_sig =
                        create_script_sig(&sigs[..self.num_of_sigs], redeem.as_bytes())?;
                }
                Ok((signed, count))
            }
            None => {
                // single-key P2PKH spend
                let Some(sig) = sigs.into_iter().next() else {
                    return Ok((signed, 0));
                };
                let key = self
                    .key_for_commitment(hash)?
                    .ok_or_else(|| BitcoinError::SigningKey("client is not a signer".into()))?;
                let push = PushBytesBuf::try_from(sig)
                    .map_err(|e| BitcoinError::TxBuild(e.to_string()))?;
                signed.input[0].script_sig = Builder::new()
                    .push_slice(push)
                    .push_slice(key.public_key(&self.secp).serialize())
                    .into_script();
                Ok((signed, 1))
            }
        }
    }

    /// Serialized signing preimages, one per input: a copy of the
    /// transaction with that input's scriptSig set to the spend script.
    pub fn tx_pre_images(&self, tx: &Transaction, hash: &CommitmentHash) -> Result<Vec<Vec<u8>>> {
        let script = self.spend_script(hash, tx)?;
        let mut images = Vec::with_capacity(tx.input.len());
        for index in 0..tx.input.len() {
            let mut copy = tx.clone();
            for input in &mut copy.input {
                input.script_sig = ScriptBuf::new();
            }
            copy.input[index].script_sig = script.clone();
            images.push(encode::serialize(&copy));
        }
        Ok(images)
    }

    /// Broadcast the attestation transaction.
    pub fn send_attestation(&self, tx: &Transaction) -> Result<Txid> {
        let txid = self.chain.send_raw_transaction(tx)?;
        info!(%txid, "attestation broadcast");
        Ok(txid)
    }

    /// Whether a transaction's spending history walks back to the
    /// staychain genesis.
    ///
    /// A missing transaction is a definitive "not on chain"; transport
    /// failures propagate so callers can retry instead of silently
    /// treating the tip as absent.
    pub fn verify_tx_on_subchain(&self, txid: &Txid) -> Result<bool> {
        let mut current = *txid;
        for _ in 0..SUBCHAIN_WALK_LIMIT {
            if current == self.txid0 {
                return Ok(true);
            }
            let tx = match self.chain.raw_transaction(&current) {
                Ok(tx) => tx,
                Err(BitcoinError::TxNotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            };
            match tx.input.first() {
                Some(input) if !input.previous_output.is_null() => {
                    current = input.previous_output.txid;
                }
                _ => return Ok(false),
            }
        }
        Err(BitcoinError::WalkDepthExceeded(SUBCHAIN_WALK_LIMIT))
    }

    /// The wallet unspent sitting on the subchain tip, if any.
    pub fn find_last_unspent(&self) -> Result<Option<Unspent>> {
        for unspent in self.chain.list_unspent()? {
            if self.verify_tx_on_subchain(&unspent.txid)? {
                return Ok(Some(unspent));
            }
        }
        Ok(None)
    }

    /// A mempool transaction extending the subchain, if any.
    pub fn unconfirmed_tx(&self) -> Result<Option<Txid>> {
        for txid in self.chain.raw_mempool()? {
            if self.verify_tx_on_subchain(&txid)? {
                return Ok(Some(txid));
            }
        }
        Ok(None)
    }

    /// Wallet view of an attestation transaction.
    pub fn wallet_transaction(&self, txid: &Txid) -> Result<crate::rpc::WalletTx> {
        self.chain.wallet_transaction(txid)
    }

    /// Fetch a raw transaction, for mempool recovery.
    pub fn transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.chain.raw_transaction(txid)
    }
}
