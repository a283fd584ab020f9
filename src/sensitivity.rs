// 5.0: pnl curve for one group across a band around the current price.
// the band runs from half to one and a half times the current price.

use crate::group::PositionGroup;
use crate::types::{Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

pub const DEFAULT_SENSITIVITY_POINTS: usize = 100;

const BAND_LOW: Decimal = dec!(0.5);
const BAND_HIGH: Decimal = dec!(1.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensitivityPoint {
    pub price: Decimal,
    pub pnl: Quote,
}

/// Evenly spaced samples over `[0.5 * current, 1.5 * current]`, both ends
/// included. `None` when fewer than two points are asked for.
pub fn price_sensitivity(
    group: &PositionGroup,
    current_price: Price,
    points: usize,
) -> Option<Vec<SensitivityPoint>> {
    if points < 2 {
        return None;
    }

    let low = current_price.value() * BAND_LOW;
    let high = current_price.value().saturating_mul(BAND_HIGH);
    let step = (high - low) / Decimal::from(points - 1);

    let curve = (0..points)
        .map(|i| {
            let price = if i == points - 1 {
                high
            } else {
                low.saturating_add(step.saturating_mul(Decimal::from(i)))
            };
            SensitivityPoint {
                price,
                pnl: group.pnl(price),
            }
        })
        .collect();
    Some(curve)
}

/// Price at which the group's PnL crosses zero.
pub fn break_even_price(group: &PositionGroup) -> Decimal {
    group.weighted_entry_price
}
