//! Forward traversal of the staychain.
//!
//! Starting from the genesis transaction, the fetcher scans parent-chain
//! blocks for the transaction spending the current tip's sole output,
//! emits each spend exactly once in topological order, and re-polls at
//! an interval once it reaches the chain tip.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use staychain_bitcoin::ParentChain;

/// One staychain transaction in traversal order.
#[derive(Debug, Clone)]
pub struct TxUpdate {
    /// Transaction id.
    pub txid: Txid,
    /// The transaction.
    pub tx: Transaction,
    /// Containing parent-chain block, when confirmed.
    pub blockhash: Option<BlockHash>,
}

/// Spend-following fetcher over a parent chain.
pub struct ChainFetcher<P> {
    chain: Arc<P>,
    poll_interval: Duration,
}

impl<P: ParentChain + 'static> ChainFetcher<P> {
    /// New fetcher polling at the given interval once at the tip.
    pub fn new(chain: Arc<P>, poll_interval: Duration) -> Self {
        Self {
            chain,
            poll_interval,
        }
    }

    /// Stream staychain transactions starting from (and including) the
    /// genesis transaction. The stream ends when the receiver is
    /// dropped or the token is cancelled.
    pub fn updates(self, genesis: Txid, token: CancellationToken) -> mpsc::Receiver<TxUpdate> {
        let (sender, receiver) = mpsc::channel(16);
        tokio::spawn(async move {
            self.run(genesis, sender, token).await;
        });
        receiver
    }

    async fn run(self, genesis: Txid, sender: mpsc::Sender<TxUpdate>, token: CancellationToken) {
        // the genesis transaction itself is the first update
        let start = loop {
            if token.is_cancelled() {
                return;
            }
            match self.chain.raw_transaction_info(&genesis) {
                Ok(info) => break info,
                Err(e) => {
                    warn!(error = %e, "genesis transaction not available yet");
                    if !self.sleep(&token).await {
                        return;
                    }
                }
            }
        };

        let mut current = genesis;
        let mut next_height = match &start.blockhash {
            Some(hash) => match self.chain.block_info(hash) {
                Ok(info) => info.height,
                Err(_) => 0,
            },
            None => 0,
        };

        if sender
            .send(TxUpdate {
                txid: genesis,
                tx: start.tx,
                blockhash: start.blockhash,
            })
            .await
            .is_err()
        {
            return;
        }

        loop {
            if token.is_cancelled() {
                return;
            }

            match self.scan(&mut current, &mut next_height, &sender).await {
                Ok(true) => {}
                // receiver dropped
                Ok(false) => return,
                Err(e) => warn!(error = %e, "staychain scan interrupted"),
            }

            if !self.sleep(&token).await {
                return;
            }
        }
    }

    /// Scan unseen blocks for spends of the current tip. Returns false
    /// when the receiver is gone.
    async fn scan(
        &self,
        current: &mut Txid,
        next_height: &mut u64,
        sender: &mpsc::Sender<TxUpdate>,
    ) -> staychain_bitcoin::Result<bool> {
        let tip = self.chain.block_count()?;
        while *next_height <= tip {
            let blockhash = self.chain.block_hash(*next_height)?;
            let block = self.chain.block(&blockhash)?;

            for tx in &block.txdata {
                let spends_tip = tx
                    .input
                    .first()
                    .map(|input| {
                        input.previous_output
                            == OutPoint {
                                txid: *current,
                                vout: 0,
                            }
                    })
                    .unwrap_or(false);
                if !spends_tip {
                    continue;
                }

                let txid = tx.compute_txid();
                debug!(%txid, height = *next_height, "staychain spend found");
                if sender
                    .send(TxUpdate {
                        txid,
                        tx: tx.clone(),
                        blockhash: Some(blockhash),
                    })
                    .await
                    .is_err()
                {
                    return Ok(false);
                }
                *current = txid;
            }

            *next_height += 1;
        }
        Ok(true)
    }

    /// Token-aware poll sleep; false when cancelled.
    async fn sleep(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, ScriptBuf, Sequence, TxIn, TxOut, Witness};

    use staychain_bitcoin::mock::MockChain;

    fn spend_of(prev: Txid, value: u64) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint { txid: prev, vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_emits_spends_in_order_exactly_once() {
        let chain = Arc::new(MockChain::new());

        let genesis = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let genesis_txid = genesis.compute_txid();
        chain.add_confirmed_tx(genesis, 1_000);

        let spend1 = spend_of(genesis_txid, 49_000);
        let spend1_txid = spend1.compute_txid();
        let block1 = chain.add_confirmed_tx(spend1, 2_000);

        let spend2 = spend_of(spend1_txid, 48_000);
        let spend2_txid = spend2.compute_txid();
        chain.add_confirmed_tx(spend2, 3_000);

        let token = CancellationToken::new();
        let fetcher = ChainFetcher::new(Arc::clone(&chain), Duration::from_millis(10));
        let mut updates = fetcher.updates(genesis_txid, token.clone());

        let first = updates.recv().await.unwrap();
        assert_eq!(first.txid, genesis_txid);

        let second = updates.recv().await.unwrap();
        assert_eq!(second.txid, spend1_txid);
        assert_eq!(second.blockhash, Some(block1));

        let third = updates.recv().await.unwrap();
        assert_eq!(third.txid, spend2_txid);

        // a later spend arriving after the tip is picked up by re-polling
        let spend3 = spend_of(spend2_txid, 47_000);
        let spend3_txid = spend3.compute_txid();
        chain.add_confirmed_tx(spend3, 4_000);

        let fourth = updates.recv().await.unwrap();
        assert_eq!(fourth.txid, spend3_txid);

        token.cancel();
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream() {
        let chain = Arc::new(MockChain::new());
        let genesis = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let genesis_txid = genesis.compute_txid();
        chain.add_confirmed_tx(genesis, 1_000);

        let token = CancellationToken::new();
        let fetcher = ChainFetcher::new(chain, Duration::from_millis(10));
        let mut updates = fetcher.updates(genesis_txid, token.clone());

        assert_eq!(updates.recv().await.unwrap().txid, genesis_txid);
        token.cancel();
        assert!(updates.recv().await.is_none());
    }
}
