//! In-memory parent chain for tests.

use std::collections::HashMap;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash as _;
use bitcoin::{
    Address, Block, BlockHash, CompactTarget, PrivateKey, Transaction, TxMerkleNode, Txid,
};
use parking_lot::Mutex;

use crate::error::{BitcoinError, Result};
use crate::rpc::{BlockInfo, ParentChain, RawTx, Unspent, WalletTx};

#[derive(Default)]
struct State {
    txs: HashMap<Txid, Transaction>,
    // txid -> containing block height
    tx_heights: HashMap<Txid, u64>,
    mempool: Vec<Txid>,
    unspent: HashMap<(Txid, u32), Unspent>,
    blocks: Vec<Block>,
    imported_addresses: Vec<Address>,
    imported_keys: Vec<String>,
    offline: bool,
}

/// A scripted parent chain holding transactions, a mempool and blocks.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    /// New empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a confirmed transaction in a fresh block, updating the
    /// unspent set, and return the block hash.
    pub fn add_confirmed_tx(&self, tx: Transaction, time: i64) -> BlockHash {
        let mut state = self.state.lock();
        Self::confirm_into_block(&mut state, vec![tx], time)
    }

    /// Move current mempool contents into a fresh block.
    pub fn confirm_mempool(&self, time: i64) -> BlockHash {
        let mut state = self.state.lock();
        let drained: Vec<Txid> = state.mempool.drain(..).collect();
        let txs: Vec<Transaction> = drained.iter().map(|txid| state.txs[txid].clone()).collect();
        Self::confirm_into_block(&mut state, txs, time)
    }

    /// Simulate the node becoming unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Drop a transaction from the mempool without confirming it,
    /// restoring the outputs it was spending.
    pub fn evict_from_mempool(&self, txid: &Txid) {
        let mut state = self.state.lock();
        state.mempool.retain(|t| t != txid);
        if let Some(tx) = state.txs.remove(txid) {
            for input in &tx.input {
                let prev = input.previous_output;
                let Some(prev_tx) = state.txs.get(&prev.txid) else {
                    continue;
                };
                if let Some(output) = prev_tx.output.get(prev.vout as usize) {
                    let unspent = Unspent {
                        txid: prev.txid,
                        vout: prev.vout,
                        amount: output.value,
                        script_pub_key: output.script_pubkey.clone(),
                    };
                    state.unspent.insert((prev.txid, prev.vout), unspent);
                }
            }
        }
    }

    /// Addresses imported through the RPC surface.
    pub fn imported_addresses(&self) -> Vec<Address> {
        self.state.lock().imported_addresses.clone()
    }

    /// Number of keys imported through the RPC surface.
    pub fn imported_key_count(&self) -> usize {
        self.state.lock().imported_keys.len()
    }

    fn confirm_into_block(state: &mut State, txs: Vec<Transaction>, time: i64) -> BlockHash {
        let height = state.blocks.len() as u64;
        let prev_blockhash = state
            .blocks
            .last()
            .map(|b| b.block_hash())
            .unwrap_or_else(BlockHash::all_zeros);

        for tx in &txs {
            let txid = tx.compute_txid();
            // spend inputs
            for input in &tx.input {
                state.unspent.remove(&(
                    input.previous_output.txid,
                    input.previous_output.vout,
                ));
            }
            // credit outputs
            for (vout, output) in tx.output.iter().enumerate() {
                state.unspent.insert(
                    (txid, vout as u32),
                    Unspent {
                        txid,
                        vout: vout as u32,
                        amount: output.value,
                        script_pub_key: output.script_pubkey.clone(),
                    },
                );
            }
            state.txs.insert(txid, tx.clone());
            state.tx_heights.insert(txid, height);
        }

        let block = Block {
            header: Header {
                version: Version::ONE,
                prev_blockhash,
                merkle_root: TxMerkleNode::all_zeros(),
                time: time as u32,
                bits: CompactTarget::from_consensus(0x207fffff),
                nonce: 0,
            },
            txdata: txs,
        };
        let hash = block.block_hash();
        state.blocks.push(block);
        hash
    }

    fn check_online(state: &State) -> Result<()> {
        if state.offline {
            return Err(BitcoinError::RpcCall("connection refused".into()));
        }
        Ok(())
    }
}

impl ParentChain for MockChain {
    fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        state
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| BitcoinError::TxNotFound(txid.to_string()))
    }

    fn raw_transaction_info(&self, txid: &Txid) -> Result<RawTx> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        let tx = state
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| BitcoinError::TxNotFound(txid.to_string()))?;
        let blockhash = state
            .tx_heights
            .get(txid)
            .map(|height| state.blocks[*height as usize].block_hash());
        Ok(RawTx { tx, blockhash })
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        let txid = tx.compute_txid();
        // outputs spent by a mempool transaction leave the unspent view,
        // matching listunspent semantics
        for input in &tx.input {
            state
                .unspent
                .remove(&(input.previous_output.txid, input.previous_output.vout));
        }
        state.txs.insert(txid, tx.clone());
        state.mempool.push(txid);
        Ok(txid)
    }

    fn list_unspent(&self) -> Result<Vec<Unspent>> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        Ok(state.unspent.values().cloned().collect())
    }

    fn raw_mempool(&self) -> Result<Vec<Txid>> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        Ok(state.mempool.clone())
    }

    fn import_address(&self, address: &Address) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        state.imported_addresses.push(address.clone());
        Ok(())
    }

    fn import_priv_key(&self, key: &PrivateKey, _label: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        state.imported_keys.push(key.to_wif());
        Ok(())
    }

    fn wallet_transaction(&self, txid: &Txid) -> Result<WalletTx> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        if !state.txs.contains_key(txid) {
            return Err(BitcoinError::TxNotFound(txid.to_string()));
        }
        match state.tx_heights.get(txid) {
            Some(height) => {
                let block = &state.blocks[*height as usize];
                Ok(WalletTx {
                    confirmations: state.blocks.len() as i64 - *height as i64,
                    blockhash: Some(block.block_hash()),
                    blocktime: Some(block.header.time as i64),
                })
            }
            None => Ok(WalletTx {
                confirmations: 0,
                blockhash: None,
                blocktime: None,
            }),
        }
    }

    fn block_info(&self, hash: &BlockHash) -> Result<BlockInfo> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        for (height, block) in state.blocks.iter().enumerate() {
            if block.block_hash() == *hash {
                return Ok(BlockInfo {
                    height: height as u64,
                    time: block.header.time as i64,
                });
            }
        }
        Err(BitcoinError::BlockNotFound(hash.to_string()))
    }

    fn block(&self, hash: &BlockHash) -> Result<Block> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        state
            .blocks
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| BitcoinError::BlockNotFound(hash.to_string()))
    }

    fn block_hash(&self, height: u64) -> Result<BlockHash> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        state
            .blocks
            .get(height as usize)
            .map(|b| b.block_hash())
            .ok_or_else(|| BitcoinError::BlockNotFound(format!("height {height}")))
    }

    fn block_count(&self) -> Result<u64> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        // tip height, matching getblockcount
        Ok(state.blocks.len().saturating_sub(1) as u64)
    }
}
