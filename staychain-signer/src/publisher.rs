//! Publisher side of the signer bus.
//!
//! Binds a single TCP listener; every connected signer receives each
//! published frame. Frames are `[u32 length][topic byte][payload]` with
//! the length covering topic and payload.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SignerError};

/// Topic-tagged frame publisher.
pub struct Publisher {
    peers: Arc<Mutex<Vec<OwnedWriteHalf>>>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Publisher {
    /// Bind on the given address and start accepting signer connections.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| SignerError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| SignerError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        let peers: Arc<Mutex<Vec<OwnedWriteHalf>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let accept_peers = Arc::clone(&peers);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "signer connected");
                            let (_, write) = stream.into_split();
                            accept_peers.lock().await.push(write);
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    },
                }
            }
        });

        Ok(Self {
            peers,
            local_addr,
            shutdown,
        })
    }

    /// Address the listener is bound on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected signers.
    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Publish a frame to every connected signer, dropping peers whose
    /// sockets have gone away.
    pub async fn publish(&self, topic: u8, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.extend_from_slice(&(1 + payload.len() as u32).to_be_bytes());
        frame.push(topic);
        frame.extend_from_slice(payload);

        let mut peers = self.peers.lock().await;
        let mut alive = Vec::with_capacity(peers.len());
        for mut peer in peers.drain(..) {
            match peer.write_all(&frame).await {
                Ok(()) => alive.push(peer),
                Err(e) => debug!(error = %e, "dropping dead signer connection"),
            }
        }
        *peers = alive;
        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
