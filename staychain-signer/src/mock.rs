//! Channel-backed signer bus for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use staychain_core::crypto::Sig;
use staychain_core::CommitmentHash;

use crate::error::Result;
use crate::signer::AttestSigner;

/// A scripted signer bus: records everything published and replies with
/// queued signature matrices.
#[derive(Default)]
pub struct MockSigner {
    confirmed_hashes: Mutex<Vec<CommitmentHash>>,
    pre_images: Mutex<Vec<Vec<Vec<u8>>>>,
    replies: Mutex<VecDeque<Vec<Vec<Sig>>>>,
    resubscribes: Mutex<usize>,
}

impl MockSigner {
    /// New bus with no queued replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a signature matrix for the next collection.
    pub fn push_sigs(&self, sigs: Vec<Vec<Sig>>) {
        self.replies.lock().push_back(sigs);
    }

    /// Confirmed hashes published so far.
    pub fn confirmed_hashes(&self) -> Vec<CommitmentHash> {
        self.confirmed_hashes.lock().clone()
    }

    /// Preimage lists published so far.
    pub fn pre_images(&self) -> Vec<Vec<Vec<u8>>> {
        self.pre_images.lock().clone()
    }

    /// How many times the subscriptions were rebuilt.
    pub fn resubscribe_count(&self) -> usize {
        *self.resubscribes.lock()
    }
}

#[async_trait]
impl AttestSigner for MockSigner {
    async fn send_confirmed_hash(&self, hash: &CommitmentHash) -> Result<()> {
        self.confirmed_hashes.lock().push(*hash);
        Ok(())
    }

    async fn send_tx_pre_images(&self, images: &[Vec<u8>]) -> Result<()> {
        self.pre_images.lock().push(images.to_vec());
        Ok(())
    }

    async fn get_sigs(&self) -> Result<Vec<Vec<Sig>>> {
        Ok(self.replies.lock().pop_front().unwrap_or_default())
    }

    async fn resubscribe(&self) -> Result<()> {
        *self.resubscribes.lock() += 1;
        Ok(())
    }
}
