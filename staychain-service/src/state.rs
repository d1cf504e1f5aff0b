//! Attestation cycle states.

use std::fmt;

/// States of the attestation cycle.
///
/// ```text
/// Init → NextCommitment → NewAttestation → SignAttestation
///      → PreSendStore → SendAttestation → AwaitConfirmation
///      → (confirmed) NextCommitment
///      → (timeout)   HandleUnconfirmed → SignAttestation
/// ```
///
/// `Init` also recovers a mempool transaction straight into
/// `AwaitConfirmation`; any cycle-fatal failure lands in `Error`, which
/// restarts from `Init` after backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestState {
    /// Locate the subchain tip or a recovery candidate.
    Init,
    /// Wait for a client commitment differing from the last confirmed.
    NextCommitment,
    /// Derive the address, build the transaction, publish preimages.
    NewAttestation,
    /// Collect signatures and finalise the scriptSig.
    SignAttestation,
    /// Persist the unconfirmed record ahead of broadcast.
    PreSendStore,
    /// Broadcast the signed transaction.
    SendAttestation,
    /// Poll the parent chain for a confirmation.
    AwaitConfirmation,
    /// Bump the fee of a stuck transaction and re-enter signing.
    HandleUnconfirmed,
    /// Cycle failed; restart from `Init` after backoff.
    Error,
}

impl fmt::Display for AttestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttestState::Init => "init",
            AttestState::NextCommitment => "next-commitment",
            AttestState::NewAttestation => "new-attestation",
            AttestState::SignAttestation => "sign-attestation",
            AttestState::PreSendStore => "pre-send-store",
            AttestState::SendAttestation => "send-attestation",
            AttestState::AwaitConfirmation => "await-confirmation",
            AttestState::HandleUnconfirmed => "handle-unconfirmed",
            AttestState::Error => "error",
        };
        f.write_str(name)
    }
}
