//! One evaluation pass: group, price, liquidate, summarize.
//!
//! The pass works on an immutable snapshot of the position list and a fully
//! resolved price map. Price fetching happens before the pass, at most once.

use super::core::Session;
use super::results::{EngineError, Evaluation, IndividualResult, RefreshResult};
use crate::account::compute_account_summary;
use crate::config::CalculatorConfig;
use crate::group::{group_positions, GroupKey};
use crate::liquidation::compute_liquidation;
use crate::position::Position;
use crate::price_feed::{price_map, resolve_prices, CachedPriceFeed, PriceFeed};
use crate::sensitivity::{price_sensitivity, SensitivityPoint};
use crate::types::{Price, Quote, Side, Symbol, Timestamp};
use std::collections::BTreeMap;

/// Evaluates a position list against a wallet and a price map. A symbol
/// missing from `current_prices` is valued at the entry price of its first
/// position, so every group and position on it shares one price.
pub fn evaluate_positions(
    positions: &[Position],
    wallet_balance: Quote,
    current_prices: &BTreeMap<Symbol, Price>,
    config: &CalculatorConfig,
) -> Evaluation {
    let mut priced = current_prices.clone();
    for pos in positions {
        priced
            .entry(pos.symbol().clone())
            .or_insert_with(|| pos.entry_price());
    }
    let current_prices = &priced;

    let groups = group_positions(positions);
    let liquidations = compute_liquidation(&groups, wallet_balance, current_prices);
    let account =
        compute_account_summary(&groups, wallet_balance, current_prices, &config.margin_bands);

    let individual = positions
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            let current_price = current_prices
                .get(pos.symbol())
                .copied()
                .unwrap_or_else(|| pos.entry_price());
            IndividualResult {
                position_id: i + 1,
                symbol: pos.symbol().clone(),
                side: pos.side(),
                entry_price: pos.entry_price(),
                leverage: pos.leverage(),
                notional_size: pos.notional_size(),
                margin_used: pos.margin_used(),
                quantity: pos.quantity(),
                current_price,
                pnl: pos.unrealized_pnl(current_price),
                price_change_pct: pos.price_change_percent(current_price),
                individual_liquidation_price: pos.individual_liquidation_price(),
            }
        })
        .collect();

    let degenerate = liquidations.iter().filter(|g| g.degenerate).count();
    tracing::debug!(
        positions = positions.len(),
        groups = liquidations.len(),
        degenerate,
        total_pnl = %account.total_pnl,
        margin_ratio = %account.margin_ratio,
        "evaluation complete"
    );

    Evaluation {
        groups: liquidations,
        account,
        individual,
        current_prices: current_prices.clone(),
    }
}

impl Session {
    /// Evaluates the current positions against caller-supplied prices.
    /// Manual overrides are applied on top.
    pub fn evaluate(&self, current_prices: &BTreeMap<Symbol, Price>) -> Evaluation {
        let mut prices = current_prices.clone();
        for (symbol, price) in &self.price_overrides {
            prices.insert(symbol.clone(), *price);
        }
        evaluate_positions(&self.positions, self.wallet_balance, &prices, &self.config)
    }

    /// Fetches prices once, resolves fallbacks and overrides, then evaluates.
    pub fn refresh_and_evaluate<F: PriceFeed>(
        &mut self,
        feed: &mut CachedPriceFeed<F>,
        now: Timestamp,
    ) -> RefreshResult {
        let symbols = self.symbols();
        let resolved = if symbols.is_empty() {
            BTreeMap::new()
        } else {
            let live = feed.get_prices_at(&symbols, now);
            resolve_prices(
                &self.positions,
                live,
                &self.config.fallback_prices,
                &self.price_overrides,
            )
        };
        self.mark_refreshed(now);

        let evaluation = evaluate_positions(
            &self.positions,
            self.wallet_balance,
            &price_map(&resolved),
            &self.config,
        );
        RefreshResult {
            evaluation,
            prices: resolved,
        }
    }

    /// PnL curve for one (symbol, side) group around its current price.
    pub fn sensitivity(
        &self,
        symbol: &str,
        side: Side,
        current_prices: &BTreeMap<Symbol, Price>,
        points: usize,
    ) -> Result<Vec<SensitivityPoint>, EngineError> {
        let not_found = || EngineError::GroupNotFound {
            symbol: symbol.to_string(),
            side,
        };
        let sym = Symbol::new(symbol).ok_or_else(not_found)?;
        let groups = group_positions(&self.positions);
        let group = groups
            .get(&GroupKey::new(sym.clone(), side))
            .ok_or_else(not_found)?;

        let current = self
            .price_overrides
            .get(&sym)
            .or_else(|| current_prices.get(&sym))
            .copied()
            .or_else(|| Price::new(group.weighted_entry_price))
            .ok_or_else(not_found)?;

        price_sensitivity(group, current, points).ok_or(EngineError::InvalidSensitivityPoints(points))
    }
}
