//! Daemon configuration file.
//!
//! A single JSON document with one section per concern:
//!
//! ```json
//! {
//!   "main": { "rpc_url": "http://127.0.0.1:18443", "network": "regtest" },
//!   "signer": { "publisher": "0.0.0.0:5000", "signers": ["sig1:5001"] },
//!   "fees": { "minFee": 10, "maxFee": 100, "feeIncrement": 5 },
//!   "initial": { "tx": "…", "pk": "…", "script": "…" }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use staychain_bitcoin::{FeesConfig, RpcConfig};
use staychain_signer::SignerConfig;

/// Initial staychain parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialConfig {
    /// Genesis attestation transaction id.
    #[serde(default)]
    pub tx: String,
    /// Wallet private key (WIF) when this node co-signs.
    #[serde(default)]
    pub pk: Option<String>,
    /// Initial multisig redeem script (hex).
    #[serde(default)]
    pub script: Option<String>,
}

fn default_fee_oracle() -> String {
    "https://mempool.space".to_string()
}

/// Full daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parent-chain node connection.
    pub main: RpcConfig,
    /// Signer bus addresses.
    #[serde(default)]
    pub signer: SignerConfig,
    /// Fee limits.
    #[serde(default)]
    pub fees: FeesConfig,
    /// Fee oracle base URL.
    #[serde(default = "default_fee_oracle")]
    pub fee_oracle_url: String,
    /// Genesis parameters.
    #[serde(default)]
    pub initial: InitialConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
