//! Subscriber side of the signer bus.
//!
//! Connects to one peer, filters frames to the subscribed topics, and
//! queues payloads until drained. Collection keeps only the newest
//! message per peer, matching the at-most-one-reply-per-cycle protocol.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, SignerError};

/// Topic-filtered subscription to a single peer.
pub struct Subscriber {
    addr: String,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    reader: JoinHandle<()>,
}

impl Subscriber {
    /// Connect to a peer and subscribe to the given topics.
    pub async fn connect(addr: &str, topics: Vec<u8>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SignerError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let peer = addr.to_string();
        let reader = tokio::spawn(async move {
            let mut stream = stream;
            loop {
                let mut len_bytes = [0u8; 4];
                if stream.read_exact(&mut len_bytes).await.is_err() {
                    debug!(peer = %peer, "subscriber stream closed");
                    break;
                }
                let len = u32::from_be_bytes(len_bytes) as usize;
                if len == 0 {
                    continue;
                }
                let mut frame = vec![0u8; len];
                if stream.read_exact(&mut frame).await.is_err() {
                    debug!(peer = %peer, "subscriber stream closed mid-frame");
                    break;
                }
                let topic = frame[0];
                if topics.contains(&topic) && tx.send(frame[1..].to_vec()).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            addr: addr.to_string(),
            rx,
            reader,
        })
    }

    /// Peer address this subscription is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Drain the queue, returning only the latest received payload.
    pub fn drain_latest(&mut self) -> Option<Vec<u8>> {
        let mut latest = None;
        while let Ok(payload) = self.rx.try_recv() {
            latest = Some(payload);
        }
        latest
    }

    /// Tear the connection down.
    pub fn close(self) {
        self.reader.abort();
    }
}
