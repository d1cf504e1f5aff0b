//! The attestation engine.
//!
//! [`AttestService`] owns the deterministic state machine driving
//! attestation cycles: pick up the latest client commitment, derive the
//! next address, build and distribute the transaction for signing,
//! persist the unconfirmed record, broadcast, await confirmation, and
//! recover from crashes and stuck transactions. One service task is the
//! only mutator of in-flight attestation state.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod error;
mod service;
mod state;

pub use error::{ErrorClass, Result, ServiceError};
pub use service::{AttestService, ServiceTiming};
pub use state::AttestState;
