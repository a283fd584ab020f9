//! Position grouping by (symbol, side).
//!
//! The exchange nets every same-symbol, same-direction position into one
//! position with a quantity-weighted entry price. Groups are derived views:
//! they are rebuilt from the position list on every evaluation pass.

use crate::position::{position_pnl, Position};
use crate::types::{Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub symbol: Symbol,
    pub side: Side,
}

impl GroupKey {
    pub fn new(symbol: Symbol, side: Side) -> Self {
        Self { symbol, side }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionGroup {
    pub key: GroupKey,
    pub position_count: usize,
    pub total_notional: Quote,
    pub total_quantity: Decimal,
    /// Zero when the group holds no quantity.
    pub weighted_entry_price: Decimal,
    pub total_margin: Quote,
    /// One when the group holds no margin.
    pub avg_leverage: Decimal,
    /// Unweighted mean of the member rates, not notional-weighted.
    pub avg_maintenance_margin_rate: Decimal,
    pub maintenance_margin: Quote,
}

impl PositionGroup {
    pub fn symbol(&self) -> &Symbol {
        &self.key.symbol
    }

    pub fn side(&self) -> Side {
        self.key.side
    }

    pub fn pnl(&self, current_price: Decimal) -> Quote {
        position_pnl(
            self.key.side,
            self.weighted_entry_price,
            current_price,
            self.total_quantity,
        )
    }

    /// Price used when no quote is available for the symbol.
    pub fn reference_price(&self, prices: &BTreeMap<Symbol, Price>) -> Decimal {
        prices
            .get(&self.key.symbol)
            .map(|p| p.value())
            .unwrap_or(self.weighted_entry_price)
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    notional: Decimal,
    quantity: Decimal,
    entry_times_quantity: Decimal,
    margin: Decimal,
    rate_sum: Decimal,
}

/// Groups positions by (symbol, side).
///
/// First pass sums the per-key totals; the weighted averages are only
/// computed once every member has been added, since they divide by the
/// complete total quantity. Keys come back sorted, so the result does not
/// depend on input order.
pub fn group_positions(positions: &[Position]) -> BTreeMap<GroupKey, PositionGroup> {
    let mut totals: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();

    for pos in positions {
        let key = GroupKey::new(pos.symbol().clone(), pos.side());
        let acc = totals.entry(key).or_default();
        acc.count += 1;
        acc.notional = acc.notional.saturating_add(pos.notional_size().value());
        acc.quantity = acc.quantity.saturating_add(pos.quantity());
        acc.entry_times_quantity = acc
            .entry_times_quantity
            .saturating_add(pos.entry_price().value().saturating_mul(pos.quantity()));
        acc.margin = acc.margin.saturating_add(pos.margin_used().value());
        acc.rate_sum += pos.maintenance_margin_rate().value();
    }

    totals
        .into_iter()
        .map(|(key, acc)| {
            let weighted_entry_price = acc
                .entry_times_quantity
                .checked_div(acc.quantity)
                .unwrap_or(Decimal::ZERO);
            let avg_leverage = acc.notional.checked_div(acc.margin).unwrap_or(Decimal::ONE);
            let avg_maintenance_margin_rate = if acc.count > 0 {
                acc.rate_sum / Decimal::from(acc.count)
            } else {
                Decimal::ZERO
            };

            let group = PositionGroup {
                key: key.clone(),
                position_count: acc.count,
                total_notional: Quote::new(acc.notional),
                total_quantity: acc.quantity,
                weighted_entry_price,
                total_margin: Quote::new(acc.margin),
                avg_leverage,
                avg_maintenance_margin_rate,
                maintenance_margin: Quote::new(acc.notional).mul(avg_maintenance_margin_rate),
            };
            (key, group)
        })
        .collect()
}
