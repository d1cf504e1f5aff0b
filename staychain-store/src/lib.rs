//! Persistent attestation records.
//!
//! [`RecordStore`] is the typed upsert/query surface the engine needs
//! from its backing document store; [`MemoryStore`] implements it
//! in-process with linearisable read-after-write. [`RecordServer`]
//! layers the engine-facing operations on top: persisting a full
//! attestation (row, then merkle commitments, proofs and info, in that
//! order) and assembling the latest client commitment from positional
//! rows.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod error;
mod memory;
mod server;
mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use server::RecordServer;
pub use traits::{AttestationRow, RecordStore};
