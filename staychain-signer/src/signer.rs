//! The signer-bus interface used by the attestation engine.

use async_trait::async_trait;
use bitcoin::hashes::Hash as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use staychain_core::crypto::Sig;
use staychain_core::CommitmentHash;

use crate::error::Result;
use crate::frame::{serialize_bytes, unserialize_bytes};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::{DEFAULT_PUBLISHER_PORT, TOPIC_CONFIRMED_HASH, TOPIC_NEW_TX, TOPIC_SIGS};

/// Signer bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Address the publisher binds on.
    #[serde(default = "default_publisher")]
    pub publisher: String,
    /// Peer signer addresses to subscribe to.
    #[serde(default)]
    pub signers: Vec<String>,
}

fn default_publisher() -> String {
    format!("0.0.0.0:{DEFAULT_PUBLISHER_PORT}")
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            publisher: default_publisher(),
            signers: Vec::new(),
        }
    }
}

/// Coordinator-side view of the signer bus.
#[async_trait]
pub trait AttestSigner: Send + Sync {
    /// Publish the last confirmed commitment so signers can derive their
    /// tweaked keys.
    async fn send_confirmed_hash(&self, hash: &CommitmentHash) -> Result<()>;

    /// Publish the serialized signing preimages, one per input.
    async fn send_tx_pre_images(&self, images: &[Vec<u8>]) -> Result<()>;

    /// Collect signature replies into a matrix indexed `[input][peer]`.
    async fn get_sigs(&self) -> Result<Vec<Vec<Sig>>>;

    /// Tear down and reconnect every peer subscription.
    async fn resubscribe(&self) -> Result<()>;
}

#[async_trait]
impl<T: AttestSigner + ?Sized> AttestSigner for std::sync::Arc<T> {
    async fn send_confirmed_hash(&self, hash: &CommitmentHash) -> Result<()> {
        (**self).send_confirmed_hash(hash).await
    }

    async fn send_tx_pre_images(&self, images: &[Vec<u8>]) -> Result<()> {
        (**self).send_tx_pre_images(images).await
    }

    async fn get_sigs(&self) -> Result<Vec<Vec<Sig>>> {
        (**self).get_sigs().await
    }

    async fn resubscribe(&self) -> Result<()> {
        (**self).resubscribe().await
    }
}

/// Fold per-peer signature lists into a per-input matrix.
///
/// The width is the maximum list length reported by any peer; a peer
/// that sent fewer signatures simply contributes no column for the
/// missing inputs.
pub fn sigs_from_messages(messages: &[Vec<Sig>]) -> Vec<Vec<Sig>> {
    let num_inputs = messages.iter().map(|m| m.len()).max().unwrap_or(0);
    let mut sigs = vec![Vec::new(); num_inputs];
    for (input_idx, row) in sigs.iter_mut().enumerate() {
        for message in messages {
            if let Some(sig) = message.get(input_idx) {
                row.push(sig.clone());
            }
        }
    }
    sigs
}

/// TCP-backed signer bus: one bound publisher, one subscriber per peer
/// filtered to the sigs topic.
pub struct TcpAttestSigner {
    publisher: Publisher,
    subscribers: Mutex<Vec<Subscriber>>,
    config: SignerConfig,
}

impl TcpAttestSigner {
    /// Bind the publisher and connect to every configured peer.
    pub async fn new(config: SignerConfig) -> Result<Self> {
        let publisher = Publisher::bind(&config.publisher).await?;
        info!(addr = %publisher.local_addr(), "signer publisher bound");

        let mut subscribers = Vec::with_capacity(config.signers.len());
        for addr in &config.signers {
            subscribers.push(Subscriber::connect(addr, vec![TOPIC_SIGS]).await?);
        }

        Ok(Self {
            publisher,
            subscribers: Mutex::new(subscribers),
            config,
        })
    }

    /// The publisher, for inspecting the bound address.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}

#[async_trait]
impl AttestSigner for TcpAttestSigner {
    async fn send_confirmed_hash(&self, hash: &CommitmentHash) -> Result<()> {
        self.publisher
            .publish(TOPIC_CONFIRMED_HASH, &hash.to_byte_array())
            .await
    }

    async fn send_tx_pre_images(&self, images: &[Vec<u8>]) -> Result<()> {
        let payload = serialize_bytes(images)?;
        self.publisher.publish(TOPIC_NEW_TX, &payload).await
    }

    async fn get_sigs(&self) -> Result<Vec<Vec<Sig>>> {
        // brief yield so in-flight replies land before the drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut subscribers = self.subscribers.lock().await;
        let mut messages: Vec<Vec<Sig>> = Vec::new();
        for subscriber in subscribers.iter_mut() {
            if let Some(payload) = subscriber.drain_latest() {
                let sigs = unserialize_bytes(&payload);
                if !sigs.is_empty() {
                    messages.push(sigs);
                }
            }
        }
        Ok(sigs_from_messages(&messages))
    }

    async fn resubscribe(&self) -> Result<()> {
        let mut subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.drain(..) {
            debug!(peer = subscriber.addr(), "closing signer subscription");
            subscriber.close();
        }
        for addr in &self.config.signers {
            subscribers.push(Subscriber::connect(addr, vec![TOPIC_SIGS]).await?);
        }
        Ok(())
    }
}
