//! Account-level margin ratio and risk banding.
//!
//! Margin ratio is total maintenance margin over current equity, in percent.
//! At 100% the account is at the liquidation line. Band thresholds are policy
//! constants supplied through configuration, not derived from the positions.

use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginBands {
    /// Ratio (percent) at or above which the account is flagged high risk.
    pub high_risk_percent: Decimal,
    /// Ratio (percent) at or above which the account is at liquidation.
    pub liquidation_percent: Decimal,
}

impl Default for MarginBands {
    fn default() -> Self {
        Self {
            high_risk_percent: dec!(80),
            liquidation_percent: dec!(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginRiskBand {
    Normal,
    HighRisk,
    LiquidationRisk,
}

/// Margin ratio in percent. Non-positive equity counts as fully at risk.
pub fn margin_ratio_percent(total_maintenance_margin: Quote, current_balance: Quote) -> Decimal {
    if current_balance.value() <= Decimal::ZERO {
        return dec!(100);
    }
    total_maintenance_margin
        .value()
        .checked_div(current_balance.value())
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .unwrap_or(Decimal::MAX)
}

pub fn classify_margin_ratio(ratio_percent: Decimal, bands: &MarginBands) -> MarginRiskBand {
    if ratio_percent >= bands.liquidation_percent {
        MarginRiskBand::LiquidationRisk
    } else if ratio_percent >= bands.high_risk_percent {
        MarginRiskBand::HighRisk
    } else {
        MarginRiskBand::Normal
    }
}

/// Wallet left after posting initial margin for every position.
pub fn free_margin(wallet_balance: Quote, margin_used: Quote) -> Quote {
    wallet_balance.sub(margin_used)
}
