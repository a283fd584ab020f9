// 7.0 config.rs: all settings in one place. leverage choices, wallet, risk bands, price feed.
// 7.1 from_env overlays environment variables on top of the defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

use crate::liquidation::DistanceBands;
use crate::margin::MarginBands;
use crate::position::ALLOWED_LEVERAGES;
use crate::price_feed::{default_fallback_prices, PriceFeedConfig};
use crate::sensitivity::DEFAULT_SENSITIVITY_POINTS;
use crate::types::{Price, Symbol};

// The complete calculator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorConfig {
    // Starting futures wallet balance (USDT)
    pub wallet_balance: Decimal,
    // Leverage choices accepted when adding a position
    pub allowed_leverages: Vec<u32>,
    // Accepted maintenance margin rate range, as fractions
    pub min_maintenance_margin_rate: Decimal,
    pub max_maintenance_margin_rate: Decimal,
    pub margin_bands: MarginBands,
    pub distance_bands: DistanceBands,
    // Auto refresh interval in seconds
    pub refresh_interval_secs: u64,
    // Samples on the price sensitivity curve
    pub sensitivity_points: usize,
    pub price_feed: PriceFeedConfig,
    // Prices used when the live feed is unavailable
    pub fallback_prices: BTreeMap<Symbol, Price>,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            wallet_balance: dec!(1000),
            allowed_leverages: ALLOWED_LEVERAGES.to_vec(),
            min_maintenance_margin_rate: dec!(0.001), // 0.1%
            max_maintenance_margin_rate: dec!(0.1),   // 10%
            margin_bands: MarginBands::default(),
            distance_bands: DistanceBands::default(),
            refresh_interval_secs: 30,
            sensitivity_points: DEFAULT_SENSITIVITY_POINTS,
            price_feed: PriceFeedConfig::default(),
            fallback_prices: default_fallback_prices(),
        }
    }
}

impl CalculatorConfig {
    // Overlay environment variables. unset variables keep their defaults,
    // malformed ones are an error rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<Decimal>("WALLET_BALANCE")? {
            config.wallet_balance = v;
        }
        if let Ok(raw) = env::var("ALLOWED_LEVERAGES") {
            config.allowed_leverages = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
                        key: "ALLOWED_LEVERAGES".to_string(),
                        value: raw.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(v) = env_parse::<u64>("REFRESH_INTERVAL_SECS")? {
            config.refresh_interval_secs = v;
        }
        if let Ok(v) = env::var("PRICE_FEED_URL") {
            config.price_feed.endpoint = v;
        }
        if let Some(v) = env_parse::<u64>("PRICE_FEED_TIMEOUT_SECS")? {
            config.price_feed.timeout_secs = v;
        }
        if let Some(v) = env_parse::<u64>("PRICE_CACHE_TTL_SECS")? {
            config.price_feed.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse::<u32>("PRICE_FEED_MAX_RETRIES")? {
            config.price_feed.max_retries = v;
        }

        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallet_balance <= Decimal::ZERO {
            return Err(ConfigError::InvalidWallet {
                reason: format!("wallet balance must be positive, got {}", self.wallet_balance),
            });
        }

        if self.allowed_leverages.is_empty() || self.allowed_leverages.contains(&0) {
            return Err(ConfigError::InvalidLeverage {
                reason: "need at least one leverage choice, all >= 1x".to_string(),
            });
        }

        if self.min_maintenance_margin_rate <= Decimal::ZERO
            || self.max_maintenance_margin_rate >= Decimal::ONE
            || self.min_maintenance_margin_rate > self.max_maintenance_margin_rate
        {
            return Err(ConfigError::InvalidMargin {
                reason: "MM rate range must sit inside (0, 1)".to_string(),
            });
        }

        if self.margin_bands.high_risk_percent >= self.margin_bands.liquidation_percent {
            return Err(ConfigError::InvalidRisk {
                reason: "high risk band must sit below the liquidation band".to_string(),
            });
        }

        if self.distance_bands.high_below_percent >= self.distance_bands.medium_below_percent {
            return Err(ConfigError::InvalidRisk {
                reason: "high distance band must sit below the medium band".to_string(),
            });
        }

        if self.sensitivity_points < 2 {
            return Err(ConfigError::InvalidRisk {
                reason: "sensitivity curve needs at least 2 points".to_string(),
            });
        }

        if self.price_feed.timeout_secs == 0 {
            return Err(ConfigError::InvalidPriceFeed {
                reason: "timeout must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }

    pub fn max_leverage(&self) -> u32 {
        self.allowed_leverages.iter().copied().max().unwrap_or(1)
    }

    pub fn is_rate_in_range(&self, rate: Decimal) -> bool {
        rate >= self.min_maintenance_margin_rate && rate <= self.max_maintenance_margin_rate
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid wallet: {reason}")]
    InvalidWallet { reason: String },

    #[error("invalid leverage set: {reason}")]
    InvalidLeverage { reason: String },

    #[error("invalid margin settings: {reason}")]
    InvalidMargin { reason: String },

    #[error("invalid risk settings: {reason}")]
    InvalidRisk { reason: String },

    #[error("invalid price feed settings: {reason}")]
    InvalidPriceFeed { reason: String },

    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidEnv { key: String, value: String },
}
