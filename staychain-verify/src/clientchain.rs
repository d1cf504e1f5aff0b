//! Client-chain adapter interface.

use async_trait::async_trait;
use bitcoin::BlockHash;

use crate::error::Result;

/// A client-chain block resolved from an anchored commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBlock {
    /// Block hash on the client chain.
    pub hash: BlockHash,
    /// Block height on the client chain.
    pub height: u64,
}

/// Read access to the attested client chain.
#[async_trait]
pub trait ClientChain: Send + Sync {
    /// Hash of the client chain tip.
    async fn best_block_hash(&self) -> Result<BlockHash>;

    /// Block lookup by hash.
    async fn block(&self, hash: &BlockHash) -> Result<ClientBlock>;
}
