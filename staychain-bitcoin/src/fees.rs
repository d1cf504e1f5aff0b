//! Fee control for attestation transactions.
//!
//! Tracks the current fee-per-byte between a configured minimum and
//! maximum, resetting from a remote fee oracle and bumping by a fixed
//! increment when a transaction lingers unconfirmed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BitcoinError, Result};

/// Default minimum fee per byte in satoshis.
pub const DEFAULT_MIN_FEE: u64 = 10;
/// Default maximum fee per byte in satoshis.
pub const DEFAULT_MAX_FEE: u64 = 100;
/// Default fee increment per bump in satoshis.
pub const DEFAULT_FEE_INCREMENT: u64 = 5;

/// Fee recommendation tier served by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeType {
    /// Next-block confirmation.
    Fastest,
    /// Confirmation within roughly half an hour.
    HalfHour,
    /// Confirmation within roughly an hour.
    #[default]
    Hour,
}

/// Source of recommended fee rates.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// The recommended fee per byte for the requested tier.
    async fn recommended_fee(&self, fee_type: FeeType) -> Result<u64>;
}

/// Response shape of the recommended-fees endpoint.
#[derive(Debug, Deserialize)]
struct RecommendedFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
    #[serde(rename = "halfHourFee")]
    half_hour_fee: u64,
    #[serde(rename = "hourFee")]
    hour_fee: u64,
}

/// HTTP fee oracle, `GET {base}/api/v1/fees/recommended`.
pub struct HttpFeeOracle {
    url: String,
    client: reqwest::Client,
}

impl HttpFeeOracle {
    /// Oracle against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            url: format!("{}/api/v1/fees/recommended", base_url.into()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl FeeOracle for HttpFeeOracle {
    async fn recommended_fee(&self, fee_type: FeeType) -> Result<u64> {
        let fees: RecommendedFees = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BitcoinError::FeeOracle(e.to_string()))?
            .error_for_status()
            .map_err(|e| BitcoinError::FeeOracle(e.to_string()))?
            .json()
            .await
            .map_err(|e| BitcoinError::FeeOracle(e.to_string()))?;

        Ok(match fee_type {
            FeeType::Fastest => fees.fastest_fee,
            FeeType::HalfHour => fees.half_hour_fee,
            FeeType::Hour => fees.hour_fee,
        })
    }
}

/// Oracle returning a fixed rate, for operators pinning fees and for
/// tests.
pub struct FixedFeeOracle {
    fee: u64,
}

impl FixedFeeOracle {
    /// Oracle that always recommends `fee` sat/byte.
    pub fn new(fee: u64) -> Self {
        Self { fee }
    }
}

#[async_trait]
impl FeeOracle for FixedFeeOracle {
    async fn recommended_fee(&self, _fee_type: FeeType) -> Result<u64> {
        Ok(self.fee)
    }
}

/// Fee limits configuration, in satoshis per byte.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesConfig {
    /// Minimum fee per byte.
    #[serde(default)]
    pub min_fee: u64,
    /// Maximum fee per byte.
    #[serde(default)]
    pub max_fee: u64,
    /// Increment per fee bump.
    #[serde(default)]
    pub fee_increment: u64,
}

/// Fee-per-byte controller, `min ≤ current ≤ max` at all times.
pub struct AttestFees {
    min_fee: u64,
    max_fee: u64,
    fee_increment: u64,
    current_fee: u64,
    fee_type: FeeType,
    oracle: Box<dyn FeeOracle>,
}

impl AttestFees {
    /// Build from configuration, falling back to the built-in defaults on
    /// invalid values.
    pub fn new(config: FeesConfig, oracle: Box<dyn FeeOracle>) -> Self {
        let min_fee = if config.min_fee > 0 && config.min_fee < DEFAULT_MAX_FEE {
            config.min_fee
        } else {
            warn!(value = config.min_fee, "invalid min fee config value");
            DEFAULT_MIN_FEE
        };
        info!(min_fee, "fees: min fee set");

        let max_fee = if config.max_fee > min_fee && config.max_fee < DEFAULT_MAX_FEE {
            config.max_fee
        } else {
            warn!(value = config.max_fee, "invalid max fee config value");
            DEFAULT_MAX_FEE
        };
        info!(max_fee, "fees: max fee set");

        let fee_increment = if config.fee_increment > 0 {
            config.fee_increment
        } else {
            warn!(
                value = config.fee_increment,
                "invalid fee increment config value"
            );
            DEFAULT_FEE_INCREMENT
        };
        info!(fee_increment, "fees: increment set");

        Self {
            min_fee,
            max_fee,
            fee_increment,
            current_fee: min_fee,
            fee_type: FeeType::default(),
            oracle,
        }
    }

    /// The current fee per byte.
    pub fn current(&self) -> u64 {
        self.current_fee
    }

    /// The configured maximum.
    pub fn max(&self) -> u64 {
        self.max_fee
    }

    /// Whether bumping can no longer raise the fee.
    pub fn is_capped(&self) -> bool {
        self.current_fee >= self.max_fee
    }

    /// Reset the current fee.
    ///
    /// With `use_min` the fee drops to the minimum; otherwise the oracle
    /// value is clamped into `[min, max]`, falling back to the minimum
    /// when the oracle is unreachable.
    pub async fn reset(&mut self, use_min: bool) {
        let fee = if use_min {
            self.min_fee
        } else {
            match self.oracle.recommended_fee(self.fee_type).await {
                Ok(fee) => fee.clamp(self.min_fee, self.max_fee),
                Err(e) => {
                    warn!(error = %e, "fee oracle unavailable, using min fee");
                    self.min_fee
                }
            }
        };
        self.current_fee = fee;
        info!(fee, "fees: current fee reset");
    }

    /// Raise the current fee by the configured increment, capped at max.
    pub fn bump(&mut self) {
        self.current_fee = (self.current_fee + self.fee_increment).min(self.max_fee);
        info!(fee = self.current_fee, "fees: bumped");
        if self.current_fee == self.max_fee {
            warn!(fee = self.current_fee, "fees: max allowed fee reached");
        }
    }
}
