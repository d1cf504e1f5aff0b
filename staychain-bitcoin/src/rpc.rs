//! Parent-chain node access.
//!
//! [`ParentChain`] is the exact RPC surface the attestation engine needs;
//! [`BitcoinRpc`] backs it with `bitcoincore-rpc`, and [`crate::mock`]
//! provides an in-memory chain for tests. Constructed and passed through
//! constructors; there is no process-global client.

use bitcoin::{Address, Amount, Block, BlockHash, PrivateKey, ScriptBuf, Transaction, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};

use crate::config::RpcConfig;
use crate::error::{BitcoinError, Result};

/// A wallet unspent output.
#[derive(Debug, Clone)]
pub struct Unspent {
    /// Funding transaction id.
    pub txid: Txid,
    /// Output index.
    pub vout: u32,
    /// Output value.
    pub amount: Amount,
    /// Locking script.
    pub script_pub_key: ScriptBuf,
}

/// Wallet view of a transaction.
#[derive(Debug, Clone)]
pub struct WalletTx {
    /// Confirmation count; zero while in the mempool.
    pub confirmations: i64,
    /// Containing block once confirmed.
    pub blockhash: Option<BlockHash>,
    /// Block time once confirmed.
    pub blocktime: Option<i64>,
}

/// A raw transaction together with its containing block, if any.
#[derive(Debug, Clone)]
pub struct RawTx {
    /// The transaction.
    pub tx: Transaction,
    /// Containing block once confirmed.
    pub blockhash: Option<BlockHash>,
}

/// Header-level block information.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    /// Block height.
    pub height: u64,
    /// Block time.
    pub time: i64,
}

/// The parent-chain RPC surface used by the attestation engine.
pub trait ParentChain: Send + Sync {
    /// Fetch a raw transaction by id.
    fn raw_transaction(&self, txid: &Txid) -> Result<Transaction>;

    /// Fetch a raw transaction with its containing block.
    fn raw_transaction_info(&self, txid: &Txid) -> Result<RawTx>;

    /// Broadcast a raw transaction.
    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid>;

    /// List wallet unspent outputs (confirmed only).
    fn list_unspent(&self) -> Result<Vec<Unspent>>;

    /// Current mempool contents.
    fn raw_mempool(&self) -> Result<Vec<Txid>>;

    /// Import an address for unspent and mempool watching.
    fn import_address(&self, address: &Address) -> Result<()>;

    /// Import a private key into the wallet, without rescan.
    fn import_priv_key(&self, key: &PrivateKey, label: &str) -> Result<()>;

    /// Wallet view of a transaction.
    fn wallet_transaction(&self, txid: &Txid) -> Result<WalletTx>;

    /// Header info for a block.
    fn block_info(&self, hash: &BlockHash) -> Result<BlockInfo>;

    /// Full block by hash.
    fn block(&self, hash: &BlockHash) -> Result<Block>;

    /// Block hash at a height.
    fn block_hash(&self, height: u64) -> Result<BlockHash>;

    /// Current chain height.
    fn block_count(&self) -> Result<u64>;
}

/// `bitcoincore-rpc` backed parent chain.
pub struct BitcoinRpc {
    client: Client,
    config: RpcConfig,
}

impl BitcoinRpc {
    /// Connect to the configured node.
    pub fn new(config: RpcConfig) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(pass)) => Auth::UserPass(user.clone(), pass.clone()),
            _ => Auth::None,
        };

        let url = if let Some(ref wallet) = config.wallet {
            format!("{}/wallet/{}", config.rpc_url, wallet)
        } else {
            config.rpc_url.clone()
        };

        let client =
            Client::new(&url, auth).map_err(|e| BitcoinError::RpcConnection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }
}

impl ParentChain for BitcoinRpc {
    fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        Ok(self.client.get_raw_transaction(txid, None)?)
    }

    fn raw_transaction_info(&self, txid: &Txid) -> Result<RawTx> {
        let info = self.client.get_raw_transaction_info(txid, None)?;
        let tx = info
            .transaction()
            .map_err(|e| BitcoinError::RpcCall(e.to_string()))?;
        Ok(RawTx {
            tx,
            blockhash: info.blockhash,
        })
    }

    fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid> {
        self.client
            .send_raw_transaction(tx)
            .map_err(|e| BitcoinError::Broadcast(e.to_string()))
    }

    fn list_unspent(&self) -> Result<Vec<Unspent>> {
        let unspent = self.client.list_unspent(Some(1), None, None, None, None)?;
        Ok(unspent
            .into_iter()
            .map(|u| Unspent {
                txid: u.txid,
                vout: u.vout,
                amount: u.amount,
                script_pub_key: u.script_pub_key,
            })
            .collect())
    }

    fn raw_mempool(&self) -> Result<Vec<Txid>> {
        Ok(self.client.get_raw_mempool()?)
    }

    fn import_address(&self, address: &Address) -> Result<()> {
        Ok(self
            .client
            .import_address(address, None, Some(false))?)
    }

    fn import_priv_key(&self, key: &PrivateKey, label: &str) -> Result<()> {
        Ok(self
            .client
            .import_private_key(key, Some(label), Some(false))?)
    }

    fn wallet_transaction(&self, txid: &Txid) -> Result<WalletTx> {
        let result = self.client.get_transaction(txid, None)?;
        Ok(WalletTx {
            confirmations: result.info.confirmations as i64,
            blockhash: result.info.blockhash,
            blocktime: result.info.blocktime.map(|t| t as i64),
        })
    }

    fn block_info(&self, hash: &BlockHash) -> Result<BlockInfo> {
        let header = self
            .client
            .get_block_header_info(hash)
            .map_err(|e| BitcoinError::BlockNotFound(e.to_string()))?;
        Ok(BlockInfo {
            height: header.height as u64,
            time: header.time as i64,
        })
    }

    fn block(&self, hash: &BlockHash) -> Result<Block> {
        self.client
            .get_block(hash)
            .map_err(|e| BitcoinError::BlockNotFound(e.to_string()))
    }

    fn block_hash(&self, height: u64) -> Result<BlockHash> {
        Ok(self.client.get_block_hash(height)?)
    }

    fn block_count(&self) -> Result<u64> {
        Ok(self.client.get_block_count()?)
    }
}
