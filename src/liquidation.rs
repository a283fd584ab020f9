//! Cross-margin liquidation prices.
//!
//! Every group draws on the same wallet. The balance backing one group is the
//! wallet plus the unrealized PnL of every other group, minus the maintenance
//! margin those other groups already tie up. A group is liquidated when its own
//! loss eats that balance down to its own maintenance margin:
//!
//! ```text
//! available + pnl(liq) == maintenance_margin
//! LONG:  liq = entry - (available - mm) / qty
//! SHORT: liq = entry + (available - mm) / qty
//! ```
//!
//! So a winning position on one symbol pushes the liquidation price of every
//! other group further away, and a losing one pulls it closer.

use crate::group::{GroupKey, PositionGroup};
use crate::types::{Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel multipliers used when the derived price is not positive.
pub const LONG_CLAMP_FACTOR: Decimal = dec!(0.01);
pub const SHORT_CLAMP_FACTOR: Decimal = dec!(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupLiquidation {
    pub key: GroupKey,
    pub position_count: usize,
    pub total_notional: Quote,
    pub total_quantity: Decimal,
    pub weighted_entry_price: Decimal,
    pub avg_leverage: Decimal,
    pub current_price: Decimal,
    pub pnl: Quote,
    pub maintenance_margin: Quote,
    pub other_pnl: Quote,
    pub other_maintenance_margin: Quote,
    pub available_balance: Quote,
    pub liquidation_price: Decimal,
    pub distance_to_liquidation_pct: Decimal,
    /// Set when `liquidation_price` is a clamp sentinel rather than a real
    /// price. Consumers should warn instead of displaying it as-is.
    pub degenerate: bool,
}

impl GroupLiquidation {
    pub fn pnl_impact(&self) -> PnlImpact {
        PnlImpact::from_pnl(self.pnl)
    }

    pub fn risk_level(&self, bands: &DistanceBands) -> RiskLevel {
        bands.classify(self.distance_to_liquidation_pct)
    }
}

/// How a group's PnL moves the liquidation prices of the other groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlImpact {
    Helping,
    Hurting,
    Neutral,
}

impl PnlImpact {
    pub fn from_pnl(pnl: Quote) -> Self {
        if pnl.is_positive() {
            PnlImpact::Helping
        } else if pnl.is_negative() {
            PnlImpact::Hurting
        } else {
            PnlImpact::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

/// Distance-to-liquidation thresholds, in percent of the current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceBands {
    pub high_below_percent: Decimal,
    pub medium_below_percent: Decimal,
}

impl Default for DistanceBands {
    fn default() -> Self {
        Self {
            high_below_percent: dec!(5),
            medium_below_percent: dec!(15),
        }
    }
}

impl DistanceBands {
    pub fn classify(&self, distance_percent: Decimal) -> RiskLevel {
        if distance_percent < self.high_below_percent {
            RiskLevel::High
        } else if distance_percent < self.medium_below_percent {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedGroup<'a> {
    pub result: &'a GroupLiquidation,
    pub risk_level: RiskLevel,
}

/// Solves for the price at which the group's loss exhausts `available`
/// down to its maintenance margin. Returns the price and whether it had to
/// be clamped. Results outside the Decimal range are clamped too.
pub fn cross_liquidation_price(
    side: Side,
    weighted_entry_price: Decimal,
    available_balance: Quote,
    maintenance_margin: Quote,
    total_quantity: Decimal,
) -> (Decimal, bool) {
    let clamped = || {
        let factor = match side {
            Side::Long => LONG_CLAMP_FACTOR,
            Side::Short => SHORT_CLAMP_FACTOR,
        };
        weighted_entry_price.checked_mul(factor).unwrap_or(Decimal::MAX)
    };

    if total_quantity <= Decimal::ZERO {
        return (clamped(), true);
    }

    let liq_price = available_balance
        .value()
        .checked_sub(maintenance_margin.value())
        .and_then(|excess| excess.checked_div(total_quantity))
        .and_then(|buffer| match side {
            Side::Long => weighted_entry_price.checked_sub(buffer),
            Side::Short => weighted_entry_price.checked_add(buffer),
        });

    match liq_price {
        Some(price) if price > Decimal::ZERO => (price, false),
        _ => (clamped(), true),
    }
}

/// `None` when the distance does not fit in a Decimal.
pub fn distance_to_liquidation_percent(
    liquidation_price: Decimal,
    current_price: Decimal,
) -> Option<Decimal> {
    if current_price <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    liquidation_price
        .checked_sub(current_price)?
        .abs()
        .checked_div(current_price)?
        .checked_mul(dec!(100))
}

/// Liquidation result for every group.
///
/// The "every other group" sums are taken as account totals minus the
/// group's own share, so the pass is linear in the number of groups.
pub fn compute_liquidation(
    groups: &BTreeMap<GroupKey, PositionGroup>,
    wallet_balance: Quote,
    current_prices: &BTreeMap<Symbol, Price>,
) -> Vec<GroupLiquidation> {
    let priced: Vec<(&PositionGroup, Decimal, Quote)> = groups
        .values()
        .map(|group| {
            let current = group.reference_price(current_prices);
            (group, current, group.pnl(current))
        })
        .collect();

    let total_pnl: Quote = priced.iter().map(|(_, _, pnl)| *pnl).sum();
    let total_mm: Quote = groups.values().map(|g| g.maintenance_margin).sum();

    priced
        .into_iter()
        .map(|(group, current_price, pnl)| {
            let other_pnl = total_pnl.sub(pnl);
            let other_mm = total_mm.sub(group.maintenance_margin);
            let available_balance = wallet_balance.add(other_pnl).sub(other_mm);

            let (liquidation_price, clamped) = cross_liquidation_price(
                group.side(),
                group.weighted_entry_price,
                available_balance,
                group.maintenance_margin,
                group.total_quantity,
            );
            let distance = distance_to_liquidation_percent(liquidation_price, current_price);
            let degenerate = clamped || distance.is_none();
            if degenerate {
                tracing::debug!(
                    symbol = %group.symbol(),
                    side = %group.side(),
                    %available_balance,
                    %liquidation_price,
                    "no realistic liquidation price"
                );
            }

            GroupLiquidation {
                key: group.key.clone(),
                position_count: group.position_count,
                total_notional: group.total_notional,
                total_quantity: group.total_quantity,
                weighted_entry_price: group.weighted_entry_price,
                avg_leverage: group.avg_leverage,
                current_price,
                pnl,
                maintenance_margin: group.maintenance_margin,
                other_pnl,
                other_maintenance_margin: other_mm,
                available_balance,
                liquidation_price,
                distance_to_liquidation_pct: distance.unwrap_or(Decimal::MAX),
                degenerate,
            }
        })
        .collect()
}

/// Closest to liquidation first. Empty in, empty out.
pub fn rank_by_risk<'a>(results: &'a [GroupLiquidation], bands: &DistanceBands) -> Vec<RankedGroup<'a>> {
    let mut ranked: Vec<RankedGroup<'a>> = results
        .iter()
        .map(|result| RankedGroup {
            result,
            risk_level: result.risk_level(bands),
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.result
            .distance_to_liquidation_pct
            .cmp(&b.result.distance_to_liquidation_pct)
    });
    ranked
}
