//! The attestation service: cycle driver and runner.

use std::time::Duration;

use bitcoin::hashes::Hash as _;
use bitcoin::{Transaction, Txid};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use staychain_bitcoin::{AttestClient, BitcoinError, ParentChain};
use staychain_core::{Attestation, CommitmentHash};
use staychain_signer::AttestSigner;
use staychain_store::{RecordServer, RecordStore, StoreError};

use crate::error::{ErrorClass, Result, ServiceError};
use crate::state::AttestState;

/// Cycle timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceTiming {
    /// Base delay between state transitions.
    pub cycle: Duration,
    /// Idle wait when no new client commitment is available.
    pub commitment_poll: Duration,
    /// Wait between signature collection rounds.
    pub sig_poll: Duration,
    /// Wait between confirmation checks.
    pub confirm_poll: Duration,
    /// Unconfirmed age that triggers a fee bump.
    pub confirm_timeout: Duration,
    /// Wait before restarting a failed cycle.
    pub error_backoff: Duration,
}

impl Default for ServiceTiming {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(5),
            commitment_poll: Duration::from_secs(60),
            sig_poll: Duration::from_secs(60),
            confirm_poll: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(60 * 60),
            error_backoff: Duration::from_secs(30),
        }
    }
}

/// In-flight transaction state, owned exclusively by the service task
/// and discarded on confirmation or cycle failure.
struct Pending {
    /// The attestation transaction under construction.
    tx: Transaction,
    /// Commitment whose tweak locks the output being spent.
    confirmed_hash: CommitmentHash,
}

/// The attestation state machine.
pub struct AttestService<P, S, D> {
    state: AttestState,
    attestation: Attestation,
    pending: Option<Pending>,
    client: AttestClient<P>,
    signer: S,
    server: RecordServer<D>,
    timing: ServiceTiming,
    sign_started: Option<Instant>,
    confirm_started: Option<Instant>,
    last_error: Option<ServiceError>,
}

impl<P, S, D> AttestService<P, S, D>
where
    P: ParentChain,
    S: AttestSigner,
    D: RecordStore,
{
    /// Build a service around its collaborators.
    pub fn new(
        client: AttestClient<P>,
        signer: S,
        server: RecordServer<D>,
        timing: ServiceTiming,
    ) -> Self {
        Self {
            state: AttestState::Init,
            attestation: Attestation::default_genesis(),
            pending: None,
            client,
            signer,
            server,
            timing,
            sign_started: None,
            confirm_started: None,
            last_error: None,
        }
    }

    /// Current state, for observability.
    pub fn state(&self) -> AttestState {
        self.state
    }

    /// Run cycles until cancelled or a fatal error surfaces.
    ///
    /// Every suspension point honours the token: the current atomic step
    /// finishes (no torn store write, no duplicate broadcast) and the
    /// loop exits cleanly.
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        info!("attestation service starting");
        loop {
            if token.is_cancelled() {
                break;
            }
            let delay = self.advance().await?;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("attestation service stopped");
        Ok(())
    }

    /// Execute one state transition, classifying failures.
    ///
    /// Returns the delay to observe before the next transition; only
    /// fatal errors propagate.
    pub async fn advance(&mut self) -> Result<Duration> {
        debug!(state = %self.state, "attestation state");
        let result = match self.state {
            AttestState::Init => self.do_init().await,
            AttestState::NextCommitment => self.do_next_commitment(),
            AttestState::NewAttestation => self.do_new_attestation().await,
            AttestState::SignAttestation => self.do_sign_attestation().await,
            AttestState::PreSendStore => self.do_pre_send_store(),
            AttestState::SendAttestation => self.do_send_attestation(),
            AttestState::AwaitConfirmation => self.do_await_confirmation().await,
            AttestState::HandleUnconfirmed => self.do_handle_unconfirmed().await,
            AttestState::Error => self.do_error(),
        };

        match result {
            Ok(delay) => Ok(delay),
            Err(e) => match e.class() {
                ErrorClass::Retry => {
                    warn!(state = %self.state, error = %e, "transient failure, retrying");
                    Ok(self.timing.error_backoff)
                }
                ErrorClass::Advance => {
                    error!(state = %self.state, error = %e, "attestation cycle failed");
                    self.last_error = Some(e);
                    self.state = AttestState::Error;
                    Ok(self.timing.cycle)
                }
                ErrorClass::Fatal => {
                    error!(state = %self.state, error = %e, "fatal attestation failure");
                    Err(e)
                }
            },
        }
    }

    /// Locate the subchain tip; fall back to a mempool recovery
    /// candidate; fail fatally when neither exists.
    async fn do_init(&mut self) -> Result<Duration> {
        // restarting after an error: reconnect possibly-stuck peer
        // subscriptions before collecting signatures again
        self.signer.resubscribe().await?;

        if let Some(unspent) = self.client.find_last_unspent()? {
            let commitment = self
                .server
                .attestation_commitment(&unspent.txid)
                .map_err(ServiceError::Store)?;
            self.attestation = match commitment {
                Some(commitment) => {
                    let mut attestation = Attestation::new(unspent.txid, commitment);
                    attestation.confirmed = true;
                    attestation
                }
                None => {
                    // genesis: confirmed tip with no stored commitment
                    let mut attestation = Attestation::default_genesis();
                    attestation.txid = unspent.txid;
                    attestation
                }
            };
            info!(txid = %unspent.txid, "subchain tip located");
            self.state = AttestState::NextCommitment;
            return Ok(self.timing.cycle);
        }

        if let Some(txid) = self.client.unconfirmed_tx()? {
            // crash recovery: the record was persisted before broadcast
            let commitment = self
                .server
                .attestation_commitment(&txid)
                .map_err(ServiceError::Store)?
                .ok_or_else(|| ServiceError::MissingRecord(txid.to_string()))?;
            let tx = self.client.transaction(&txid)?;
            let confirmed_hash = self
                .server
                .latest_confirmed_commitment_hash()
                .map_err(ServiceError::Store)?;

            self.attestation = Attestation::new(txid, commitment);
            self.pending = Some(Pending { tx, confirmed_hash });
            self.confirm_started = Some(Instant::now());
            warn!(%txid, "recovered unconfirmed attestation from mempool");
            self.state = AttestState::AwaitConfirmation;
            return Ok(self.timing.confirm_poll);
        }

        Err(ServiceError::Uninitialised)
    }

    /// Pick up the latest client commitment; idle while it matches the
    /// last confirmed attestation.
    fn do_next_commitment(&mut self) -> Result<Duration> {
        let commitment = match self.server.client_commitment() {
            Ok(commitment) => commitment,
            Err(StoreError::Core(staychain_core::Error::CommitmentListEmpty)) => {
                debug!("no client commitments yet");
                return Ok(self.timing.commitment_poll);
            }
            Err(e) => return Err(ServiceError::Store(e)),
        };

        if commitment.root() == self.attestation.commitment_hash() {
            debug!(root = %commitment.root(), "commitment unchanged, idling");
            return Ok(self.timing.commitment_poll);
        }

        info!(root = %commitment.root(), "new commitment to attest");
        self.attestation = Attestation::new(Txid::all_zeros(), commitment);
        self.state = AttestState::NewAttestation;
        Ok(self.timing.cycle)
    }

    /// Build the unsigned transaction and hand the preimages to the
    /// signers.
    async fn do_new_attestation(&mut self) -> Result<Duration> {
        let unspent = self.client.find_last_unspent()?.ok_or(ServiceError::NoUnspent)?;
        let confirmed_hash = self
            .server
            .latest_confirmed_commitment_hash()
            .map_err(ServiceError::Store)?;

        // the unspent must be locked by the script derived from the last
        // confirmed commitment
        let (expected, _) = self.client.next_attestation_addr(&confirmed_hash)?;
        if expected.script_pubkey() != unspent.script_pub_key {
            return Err(ServiceError::AddressMismatch(format!(
                "unspent {} does not match derivation for {}",
                unspent.txid, confirmed_hash
            )));
        }

        self.client.fees_mut().reset(false).await;

        let target = self.attestation.commitment_hash();
        let (address, _) = self.client.next_attestation_addr(&target)?;
        self.client.import_attestation_addr(&address)?;
        let tx = self.client.create_attestation(&address, &unspent)?;
        info!(%address, value = tx.output[0].value.to_sat(), "attestation built");

        let pre_images = self.client.tx_pre_images(&tx, &confirmed_hash)?;
        self.signer.send_confirmed_hash(&confirmed_hash).await?;
        self.signer.send_tx_pre_images(&pre_images).await?;

        self.pending = Some(Pending { tx, confirmed_hash });
        self.sign_started = Some(Instant::now());
        self.state = AttestState::SignAttestation;
        Ok(self.timing.sig_poll)
    }

    /// Collect peer signatures and finalise once M are available.
    async fn do_sign_attestation(&mut self) -> Result<Duration> {
        let sigs = self.signer.get_sigs().await?;
        let input_sigs = sigs.into_iter().next().unwrap_or_default();

        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| ServiceError::Internal("signing without a pending tx".into()))?;
        let confirmed_hash = pending.confirmed_hash;
        let (signed, count) =
            self.client
                .sign_attestation(&pending.tx, &input_sigs, &confirmed_hash)?;

        let need = self.client.num_of_sigs();
        if count < need {
            let lapsed = self
                .sign_started
                .map(|started| started.elapsed() >= self.timing.confirm_timeout)
                .unwrap_or(false);
            if lapsed {
                warn!(have = count, need, "signature deadline lapsed");
                self.state = AttestState::HandleUnconfirmed;
                return Ok(self.timing.cycle);
            }
            debug!(have = count, need, "insufficient signatures, polling again");
            return Ok(self.timing.sig_poll);
        }

        pending.tx = signed;
        self.attestation.txid = pending.tx.compute_txid();
        info!(txid = %self.attestation.txid, sigs = count, "attestation fully signed");
        self.state = AttestState::PreSendStore;
        Ok(self.timing.cycle)
    }

    /// Persist the unconfirmed record. Runs strictly before broadcast so
    /// a crash in between is recoverable from the mempool.
    fn do_pre_send_store(&mut self) -> Result<Duration> {
        self.server
            .update_latest_attestation(&self.attestation)
            .map_err(ServiceError::Store)?;
        info!(txid = %self.attestation.txid, "unconfirmed attestation stored");
        self.state = AttestState::SendAttestation;
        Ok(self.timing.cycle)
    }

    /// Broadcast the signed transaction.
    fn do_send_attestation(&mut self) -> Result<Duration> {
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| ServiceError::Internal("sending without a pending tx".into()))?;
        let txid = self.client.send_attestation(&pending.tx)?;
        if txid != self.attestation.txid {
            return Err(ServiceError::Internal(format!(
                "broadcast txid {txid} does not match stored record {}",
                self.attestation.txid
            )));
        }
        self.confirm_started = Some(Instant::now());
        self.state = AttestState::AwaitConfirmation;
        Ok(self.timing.confirm_poll)
    }

    /// Poll for a confirmation, bumping the fee once the transaction has
    /// lingered past the confirm timeout.
    async fn do_await_confirmation(&mut self) -> Result<Duration> {
        let wallet_tx = match self.client.wallet_transaction(&self.attestation.txid) {
            Ok(wallet_tx) => Some(wallet_tx),
            // an evicted transaction is handled by the timeout path
            Err(BitcoinError::TxNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(wallet_tx) = wallet_tx {
            if wallet_tx.confirmations > 0 {
                let blockhash = wallet_tx.blockhash.ok_or_else(|| {
                    ServiceError::Internal("confirmed tx without blockhash".into())
                })?;
                let amount = self
                    .pending
                    .as_ref()
                    .map(|p| p.tx.output[0].value.to_sat() as i64)
                    .unwrap_or(0);

                self.attestation.mark_confirmed(
                    blockhash,
                    wallet_tx.blocktime.unwrap_or_default(),
                    amount,
                )?;
                // losing the record of an on-chain artifact is fatal
                self.server
                    .update_latest_attestation(&self.attestation)
                    .map_err(ServiceError::StoreAfterBroadcast)?;
                info!(
                    txid = %self.attestation.txid,
                    %blockhash,
                    "attestation confirmed"
                );

                self.client.fees_mut().reset(true).await;
                self.pending = None;
                self.sign_started = None;
                self.confirm_started = None;
                self.state = AttestState::NextCommitment;
                return Ok(self.timing.cycle);
            }
        }

        let lapsed = self
            .confirm_started
            .map(|started| started.elapsed() >= self.timing.confirm_timeout)
            .unwrap_or(false);
        if lapsed {
            warn!(txid = %self.attestation.txid, "confirmation timeout exceeded");
            self.state = AttestState::HandleUnconfirmed;
            return Ok(self.timing.cycle);
        }
        Ok(self.timing.confirm_poll)
    }

    /// Bump the fee of the stuck transaction and re-enter signing with
    /// fresh preimages.
    async fn do_handle_unconfirmed(&mut self) -> Result<Duration> {
        if self.client.fees().is_capped() {
            // the fee can no longer rise; surface instead of cycling
            return Err(ServiceError::FeeCapReached);
        }

        let mut pending = self
            .pending
            .take()
            .ok_or_else(|| ServiceError::Internal("fee bump without a pending tx".into()))?;
        self.client.bump_attestation_fees(&mut pending.tx)?;
        self.attestation.confirmed = false;

        // signers must observe the bumped transaction
        let pre_images = self.client.tx_pre_images(&pending.tx, &pending.confirmed_hash)?;
        self.signer.send_confirmed_hash(&pending.confirmed_hash).await?;
        self.signer.send_tx_pre_images(&pre_images).await?;

        self.pending = Some(pending);
        self.sign_started = Some(Instant::now());
        self.state = AttestState::SignAttestation;
        Ok(self.timing.sig_poll)
    }

    /// Log the failure and restart from `Init` after backoff.
    fn do_error(&mut self) -> Result<Duration> {
        if let Some(e) = self.last_error.take() {
            error!(error = %e, "attestation cycle aborted, restarting");
        }
        self.pending = None;
        self.sign_started = None;
        self.confirm_started = None;
        self.state = AttestState::Init;
        Ok(self.timing.error_backoff)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash as _;
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Network, PrivateKey, ScriptBuf, TxOut};

    use staychain_bitcoin::mock::MockChain;
    use staychain_bitcoin::{AttestConfig, AttestFees, FeesConfig, FixedFeeOracle};
    use staychain_core::crypto::{create_multisig, Sig};
    use staychain_core::{Commitment, SigningKey};
    use staychain_signer::mock::MockSigner;
    use staychain_store::{MemoryStore, RecordStore as _};

    use super::*;

    const GENESIS_VALUE: u64 = 100_000_000;

    fn deterministic_key(seed: u8) -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        let sk = SecretKey::from_slice(&bytes).unwrap();
        SigningKey::new(PrivateKey::new(sk, Network::Regtest))
    }

    fn hash(byte: u8) -> CommitmentHash {
        CommitmentHash::from_byte_array([byte; 32])
    }

    fn peer_sig() -> Sig {
        vec![0x30, 0x44, 0x02, 0x20, 0xAB, 0x01]
    }

    fn fast_timing() -> ServiceTiming {
        ServiceTiming {
            cycle: Duration::from_millis(1),
            commitment_poll: Duration::from_millis(1),
            sig_poll: Duration::from_millis(1),
            confirm_poll: Duration::from_millis(1),
            confirm_timeout: Duration::from_secs(3600),
            error_backoff: Duration::from_millis(1),
        }
    }

    struct Harness {
        chain: Arc<MockChain>,
        signer: Arc<MockSigner>,
        store: Arc<MemoryStore>,
        service: AttestService<MockChain, Arc<MockSigner>, Arc<MemoryStore>>,
        script0: ScriptBuf,
        genesis_txid: Txid,
        timing: ServiceTiming,
        oracle_fee: u64,
    }

    fn build_service(
        chain: &Arc<MockChain>,
        signer: &Arc<MockSigner>,
        store: &Arc<MemoryStore>,
        script0: &ScriptBuf,
        genesis_txid: Txid,
        timing: ServiceTiming,
        oracle_fee: u64,
    ) -> AttestService<MockChain, Arc<MockSigner>, Arc<MemoryStore>> {
        let fees = AttestFees::new(
            FeesConfig {
                min_fee: 5,
                max_fee: 80,
                fee_increment: 5,
            },
            Box::new(FixedFeeOracle::new(oracle_fee)),
        );
        let client = AttestClient::new(
            Arc::clone(chain),
            fees,
            AttestConfig {
                init_txid: genesis_txid,
                multisig_script: Some(script0.clone()),
                signing_key: Some(deterministic_key(1)),
                network: Network::Regtest,
            },
        )
        .unwrap();
        AttestService::new(
            client,
            Arc::clone(signer),
            RecordServer::new(Arc::clone(store)),
            timing,
        )
    }

    impl Harness {
        /// 2-of-2 multisig staychain with a funded genesis; the local
        /// key contributes one signature, the mock peer the other.
        fn new(timing: ServiceTiming, oracle_fee: u64) -> Self {
            let secp = Secp256k1::new();
            let keys = [deterministic_key(1), deterministic_key(2)];
            let pubkeys: Vec<PublicKey> = keys.iter().map(|k| k.public_key(&secp)).collect();
            let (address, script0) = create_multisig(&pubkeys, 2, Network::Regtest).unwrap();

            let genesis_tx = Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: vec![],
                output: vec![TxOut {
                    value: Amount::from_sat(GENESIS_VALUE),
                    script_pubkey: address.script_pubkey(),
                }],
            };
            let genesis_txid = genesis_tx.compute_txid();

            let chain = Arc::new(MockChain::new());
            chain.add_confirmed_tx(genesis_tx, 1_542_000_000);

            let signer = Arc::new(MockSigner::new());
            let store = Arc::new(MemoryStore::new());
            let service = build_service(
                &chain,
                &signer,
                &store,
                &script0,
                genesis_txid,
                timing,
                oracle_fee,
            );

            Self {
                chain,
                signer,
                store,
                service,
                script0,
                genesis_txid,
                timing,
                oracle_fee,
            }
        }

        fn rebuild_service(
            &self,
        ) -> AttestService<MockChain, Arc<MockSigner>, Arc<MemoryStore>> {
            build_service(
                &self.chain,
                &self.signer,
                &self.store,
                &self.script0,
                self.genesis_txid,
                self.timing,
                self.oracle_fee,
            )
        }

        /// Drive from `Init` through broadcast into `AwaitConfirmation`.
        async fn drive_to_broadcast(&mut self) -> Txid {
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::NextCommitment);
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::NewAttestation);
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::SignAttestation);

            self.signer.push_sigs(vec![vec![peer_sig()]]);
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::PreSendStore);
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::SendAttestation);
            self.service.advance().await.unwrap();
            assert_eq!(self.service.state(), AttestState::AwaitConfirmation);
            self.service.attestation.txid
        }
    }

    #[tokio::test]
    async fn test_happy_path_cycle() {
        let mut harness = Harness::new(fast_timing(), 10);
        harness.store.set_client_commitment(0, hash(0x01));
        harness.store.set_client_commitment(1, hash(0x02));
        harness.store.set_client_commitment(2, hash(0x03));
        let expected_root = Commitment::new(vec![hash(0x01), hash(0x02), hash(0x03)])
            .unwrap()
            .root();

        // Init locates the genesis unspent
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
        assert_eq!(harness.signer.resubscribe_count(), 1);

        // the client commitment differs from the (zero) genesis hash
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NewAttestation);
        assert_eq!(harness.service.attestation.commitment_hash(), expected_root);

        // build + publish: signers receive the zero confirmed hash and
        // one preimage for the single input
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::SignAttestation);
        assert_eq!(
            harness.signer.confirmed_hashes(),
            vec![CommitmentHash::all_zeros()]
        );
        assert_eq!(harness.signer.pre_images().len(), 1);
        assert_eq!(harness.signer.pre_images()[0].len(), 1);

        // no replies yet: keep polling
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::SignAttestation);

        // the peer signature completes the 2-of-2
        harness.signer.push_sigs(vec![vec![peer_sig()]]);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::PreSendStore);
        let txid = harness.service.attestation.txid;
        assert_ne!(txid, Txid::all_zeros());

        // unconfirmed record lands before broadcast
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::SendAttestation);
        assert_eq!(
            harness.store.latest_attestation_merkle_root(false).unwrap(),
            Some(expected_root)
        );
        assert_eq!(
            harness.store.latest_attestation_merkle_root(true).unwrap(),
            None
        );
        assert!(harness.chain.raw_mempool().unwrap().is_empty());

        // broadcast
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::AwaitConfirmation);
        assert_eq!(harness.chain.raw_mempool().unwrap(), vec![txid]);

        // still unconfirmed: stay waiting
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::AwaitConfirmation);

        // block found: info persisted, loop restarts
        let blockhash = harness.chain.confirm_mempool(1_542_121_293);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
        let attestation = &harness.service.attestation;
        assert!(attestation.confirmed);
        assert_eq!(attestation.info.blockhash, blockhash);
        assert_eq!(attestation.info.time, 1_542_121_293);
        // full input amount minus the size-based fee
        assert!(attestation.info.amount > 0);
        assert!((attestation.info.amount as u64) < GENESIS_VALUE);
        assert_eq!(
            harness.store.latest_attestation_merkle_root(true).unwrap(),
            Some(expected_root)
        );

        // identical commitment: the machine idles
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
    }

    #[tokio::test]
    async fn test_recovery_from_mempool_after_crash() {
        let mut harness = Harness::new(fast_timing(), 10);
        harness.store.set_client_commitment(0, hash(0x01));
        let txid = harness.drive_to_broadcast().await;

        // crash: a fresh service over the same chain and store must pick
        // the mempool transaction up, not start a new cycle
        let mut recovered = harness.rebuild_service();
        recovered.advance().await.unwrap();
        assert_eq!(recovered.state(), AttestState::AwaitConfirmation);
        assert_eq!(recovered.attestation.txid, txid);

        let blockhash = harness.chain.confirm_mempool(1_542_121_400);
        recovered.advance().await.unwrap();
        assert_eq!(recovered.state(), AttestState::NextCommitment);
        assert!(recovered.attestation.confirmed);
        assert_eq!(recovered.attestation.info.blockhash, blockhash);
    }

    #[tokio::test]
    async fn test_confirm_timeout_bumps_fee_and_resigns() {
        let timing = ServiceTiming {
            confirm_timeout: Duration::ZERO,
            ..fast_timing()
        };
        let mut harness = Harness::new(timing, 10);
        harness.store.set_client_commitment(0, hash(0x01));
        let first_txid = harness.drive_to_broadcast().await;

        // timeout fires immediately
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::HandleUnconfirmed);

        // bump republishes the confirmed hash and fresh preimages
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::SignAttestation);
        assert_eq!(harness.signer.confirmed_hashes().len(), 2);
        assert_eq!(harness.signer.pre_images().len(), 2);

        // re-sign and re-store under the replacement txid
        harness.signer.push_sigs(vec![vec![peer_sig()]]);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::PreSendStore);
        assert_ne!(harness.service.attestation.txid, first_txid);

        harness.service.advance().await.unwrap();
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::AwaitConfirmation);

        let blockhash = harness.chain.confirm_mempool(1_542_121_500);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
        assert_eq!(harness.service.attestation.info.blockhash, blockhash);
    }

    #[tokio::test]
    async fn test_fee_cap_with_stuck_tx_is_cycle_fatal() {
        let timing = ServiceTiming {
            confirm_timeout: Duration::ZERO,
            ..fast_timing()
        };
        // oracle above max: the cycle starts already at the cap
        let mut harness = Harness::new(timing, 200);
        harness.store.set_client_commitment(0, hash(0x01));
        harness.drive_to_broadcast().await;

        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::HandleUnconfirmed);

        // capped: the machine surfaces the failure instead of cycling
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::Error);

        // the error state restarts from init
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::Init);
    }

    #[tokio::test]
    async fn test_transient_rpc_failure_retries_same_state() {
        let mut harness = Harness::new(fast_timing(), 10);
        harness.store.set_client_commitment(0, hash(0x01));

        harness.chain.set_offline(true);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::Init);

        harness.chain.set_offline(false);
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
    }

    #[tokio::test]
    async fn test_uninitialised_chain_is_fatal() {
        let harness = Harness::new(fast_timing(), 10);
        // a service over an empty wallet: no unspent, no mempool entry
        let empty_chain = Arc::new(MockChain::new());
        let fees = AttestFees::new(
            FeesConfig {
                min_fee: 5,
                max_fee: 80,
                fee_increment: 5,
            },
            Box::new(FixedFeeOracle::new(10)),
        );
        let client = AttestClient::new(
            Arc::clone(&empty_chain),
            fees,
            AttestConfig {
                init_txid: harness.genesis_txid,
                multisig_script: Some(harness.script0.clone()),
                signing_key: Some(deterministic_key(1)),
                network: Network::Regtest,
            },
        )
        .unwrap();
        let mut service = AttestService::new(
            client,
            Arc::new(MockSigner::new()),
            RecordServer::new(Arc::new(MemoryStore::new())),
            fast_timing(),
        );

        let err = service.advance().await.unwrap_err();
        assert!(matches!(err, ServiceError::Uninitialised));
    }

    #[tokio::test]
    async fn test_no_commitments_idles_in_next_commitment() {
        let mut harness = Harness::new(fast_timing(), 10);
        harness.service.advance().await.unwrap();
        harness.service.advance().await.unwrap();
        assert_eq!(harness.service.state(), AttestState::NextCommitment);
    }
}
