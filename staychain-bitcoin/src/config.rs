//! Parent-chain RPC configuration.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::{BitcoinError, Result};

/// Connection settings for the parent-chain node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint URL.
    pub rpc_url: String,

    /// RPC username (optional).
    pub rpc_user: Option<String>,

    /// RPC password (optional).
    pub rpc_password: Option<String>,

    /// Wallet name for multi-wallet nodes (optional).
    pub wallet: Option<String>,

    /// Bitcoin network the node runs on.
    pub network: Network,
}

impl RpcConfig {
    /// Create a new configuration.
    pub fn new(rpc_url: impl Into<String>, network: Network) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            rpc_user: None,
            rpc_password: None,
            wallet: None,
            network,
        }
    }

    /// Create configuration for regtest.
    pub fn regtest(rpc_url: impl Into<String>) -> Self {
        Self::new(rpc_url, Network::Regtest)
    }

    /// Set RPC authentication.
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self.rpc_password = Some(password.into());
        self
    }

    /// Set wallet name.
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(BitcoinError::Config("RPC URL is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RpcConfig::regtest("http://localhost:18443")
            .with_auth("user", "pass")
            .with_wallet("attest");

        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.rpc_user, Some("user".to_string()));
        assert_eq!(config.wallet, Some("attest".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(RpcConfig::new("", Network::Bitcoin).validate().is_err());
    }
}
