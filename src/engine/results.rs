// 8.0.2: result types and errors for session operations.

use crate::account::AccountSummary;
use crate::config::ConfigError;
use crate::liquidation::{rank_by_risk, DistanceBands, GroupLiquidation, RankedGroup};
use crate::position::PositionError;
use crate::price_feed::ResolvedPrice;
use crate::types::{Leverage, Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// One position seen on its own, before grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndividualResult {
    /// 1-based, in insertion order
    pub position_id: usize,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Price,
    pub leverage: Leverage,
    pub notional_size: Quote,
    pub margin_used: Quote,
    pub quantity: Decimal,
    pub current_price: Price,
    pub pnl: Quote,
    pub price_change_pct: Decimal,
    /// Isolated-margin reference, ignores every other position
    pub individual_liquidation_price: Price,
}

/// Output of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub groups: Vec<GroupLiquidation>,
    pub account: AccountSummary,
    pub individual: Vec<IndividualResult>,
    pub current_prices: BTreeMap<Symbol, Price>,
}

impl Evaluation {
    pub fn group(&self, symbol: &str, side: Side) -> Option<&GroupLiquidation> {
        let symbol = Symbol::new(symbol)?;
        self.groups
            .iter()
            .find(|g| g.key.symbol == symbol && g.key.side == side)
    }

    pub fn risk_ranking(&self, bands: &DistanceBands) -> Vec<RankedGroup<'_>> {
        rank_by_risk(&self.groups, bands)
    }

    pub fn degenerate_groups(&self) -> impl Iterator<Item = &GroupLiquidation> {
        self.groups.iter().filter(|g| g.degenerate)
    }

    pub fn has_interactions(&self) -> bool {
        self.groups.len() > 1
    }
}

/// Evaluation plus where each price came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub evaluation: Evaluation,
    pub prices: BTreeMap<Symbol, ResolvedPrice>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Position rejected: {0}")]
    Position(#[from] PositionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wallet balance must be positive, got {0}")]
    InvalidWalletBalance(Decimal),

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("No {side} position open in {symbol}")]
    GroupNotFound { symbol: String, side: Side },

    #[error("Sensitivity curve needs at least 2 points, got {0}")]
    InvalidSensitivityPoints(usize),
}
