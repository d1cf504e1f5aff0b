//! Attestation API access.
//!
//! The verifier resolves the commitments each attestation anchored
//! through the attestation service's public API.

use async_trait::async_trait;
use bitcoin::Txid;
use serde::Deserialize;

use staychain_core::{ClientCommitment, CommitmentHash};

use crate::error::{Result, VerifyError};

/// The commitments one attestation anchored.
#[derive(Debug, Clone)]
pub struct AttestationCommitments {
    /// Merkle root anchored by the attestation.
    pub merkle_root: CommitmentHash,
    /// Positional leaves of the attestation tree.
    pub commitments: Vec<ClientCommitment>,
}

/// Source of per-attestation commitments.
#[async_trait]
pub trait CommitmentApi: Send + Sync {
    /// The commitments anchored by the attestation with this txid.
    async fn attestation_commitments(&self, txid: &Txid) -> Result<AttestationCommitments>;
}

#[async_trait]
impl<T: CommitmentApi + ?Sized> CommitmentApi for std::sync::Arc<T> {
    async fn attestation_commitments(&self, txid: &Txid) -> Result<AttestationCommitments> {
        (**self).attestation_commitments(txid).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommitment {
    position: u32,
    commitment: String,
}

#[derive(Debug, Deserialize)]
struct ApiAttestation {
    merkle_root: String,
    commitments: Vec<ApiCommitment>,
}

/// HTTP client for the attestation API,
/// `GET {host}/api/v1/attestation/commitments?txid=…`.
pub struct HttpCommitmentApi {
    host: String,
    client: reqwest::Client,
}

impl HttpCommitmentApi {
    /// Client against the given API host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CommitmentApi for HttpCommitmentApi {
    async fn attestation_commitments(&self, txid: &Txid) -> Result<AttestationCommitments> {
        let url = format!("{}/api/v1/attestation/commitments", self.host);
        let response: ApiAttestation = self
            .client
            .get(&url)
            .query(&[("txid", txid.to_string())])
            .send()
            .await
            .map_err(|e| VerifyError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| VerifyError::Api(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerifyError::Api(e.to_string()))?;

        let merkle_root = response
            .merkle_root
            .parse()
            .map_err(|e| VerifyError::Api(format!("bad merkle root: {e}")))?;
        let commitments = response
            .commitments
            .into_iter()
            .map(|c| {
                Ok(ClientCommitment {
                    client_position: c.position,
                    commitment: c
                        .commitment
                        .parse()
                        .map_err(|e| VerifyError::Api(format!("bad commitment: {e}")))?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(AttestationCommitments {
            merkle_root,
            commitments,
        })
    }
}
