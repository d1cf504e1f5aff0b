//! Signer transport for distributed attestation signing.
//!
//! The coordinator publishes the previous confirmed commitment and the
//! new transaction preimages on topic-tagged frames; each remote signer
//! derives its tweaked key, signs, and replies on the sigs topic. The
//! coordinator drains each peer's queue keeping only the latest reply
//! and folds the replies into a per-input signature matrix.
//!
//! Frames are `[topic byte][payload]` over a length-delimited TCP
//! stream; payloads carrying multiple byte chunks use the length-prefix
//! framing of [`frame`].

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod error;
pub mod frame;
pub mod mock;
mod publisher;
mod signer;
mod subscriber;

pub use error::{Result, SignerError};
pub use publisher::Publisher;
pub use signer::{sigs_from_messages, AttestSigner, SignerConfig, TcpAttestSigner};
pub use subscriber::Subscriber;

/// Topic tag for new-transaction preimage lists.
pub const TOPIC_NEW_TX: u8 = b'T';
/// Topic tag for the last confirmed commitment hash.
pub const TOPIC_CONFIRMED_HASH: u8 = b'C';
/// Topic tag for signature replies.
pub const TOPIC_SIGS: u8 = b'S';

/// Default port the coordinator's publisher binds on.
pub const DEFAULT_PUBLISHER_PORT: u16 = 5000;
