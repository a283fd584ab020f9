// 8.0 engine/core.rs: the session. owns the position list, wallet, refresh flag and price overrides.
// every derived view (groups, account) is rebuilt from this state on each evaluation.

use super::results::EngineError;
use crate::config::CalculatorConfig;
use crate::position::{Position, PositionError, PositionInput};
use crate::price_feed::symbols_in_play;
use crate::types::{Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/** 8.1: session struct. all user state lives here, nothing is global */
#[derive(Debug, Clone)]
pub struct Session {
    pub(super) config: CalculatorConfig,
    pub(super) positions: Vec<Position>,
    pub(super) wallet_balance: Quote,
    pub(super) auto_refresh: bool,
    pub(super) last_update: Option<Timestamp>,
    pub(super) price_overrides: BTreeMap<Symbol, Price>,
}

impl Session {
    pub fn new(config: CalculatorConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let wallet_balance = Quote::new(config.wallet_balance);
        Ok(Self {
            config,
            positions: Vec::new(),
            wallet_balance,
            auto_refresh: false,
            last_update: None,
            price_overrides: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn add_position(&mut self, input: &PositionInput) -> Result<&Position, EngineError> {
        if !self.config.is_rate_in_range(input.maintenance_margin_rate) {
            return Err(PositionError::MarginRateOutOfRange(input.maintenance_margin_rate).into());
        }
        let position = Position::from_input(input, &self.config.allowed_leverages)?;

        tracing::info!(
            symbol = %position.symbol(),
            side = %position.side(),
            margin_used = %position.margin_used(),
            quantity = %position.quantity(),
            "position added"
        );

        self.positions.push(position);
        Ok(&self.positions[self.positions.len() - 1])
    }

    pub fn open(
        &mut self,
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        leverage: u32,
        notional_size: Decimal,
        maintenance_margin_rate: Decimal,
    ) -> Result<&Position, EngineError> {
        self.add_position(&PositionInput {
            symbol: symbol.to_string(),
            side,
            entry_price,
            leverage,
            notional_size,
            maintenance_margin_rate,
        })
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear_positions(&mut self) {
        tracing::info!(count = self.positions.len(), "positions cleared");
        self.positions.clear();
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        symbols_in_play(&self.positions)
    }

    pub fn wallet_balance(&self) -> Quote {
        self.wallet_balance
    }

    pub fn set_wallet_balance(&mut self, balance: Decimal) -> Result<(), EngineError> {
        if balance <= Decimal::ZERO {
            return Err(EngineError::InvalidWalletBalance(balance));
        }
        self.wallet_balance = Quote::new(balance);
        Ok(())
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.auto_refresh = enabled;
    }

    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    // true when auto refresh is on and the interval has elapsed (or nothing was fetched yet)
    pub fn needs_refresh(&self, now: Timestamp) -> bool {
        if !self.auto_refresh {
            return false;
        }
        let interval_ms = i64::try_from(self.config.refresh_interval_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        match self.last_update {
            Some(last) => last.elapsed_millis(&now) >= interval_ms,
            None => true,
        }
    }

    pub fn mark_refreshed(&mut self, now: Timestamp) {
        self.last_update = Some(now);
    }

    /// Pins a symbol to a manual price. Zero clears the pin.
    pub fn set_price_override(&mut self, symbol: &str, price: Decimal) -> Result<(), EngineError> {
        let sym = Symbol::new(symbol)
            .ok_or_else(|| PositionError::InvalidSymbol(symbol.to_string()))?;
        if price.is_zero() {
            self.price_overrides.remove(&sym);
            return Ok(());
        }
        let price = Price::new(price).ok_or(EngineError::InvalidPrice {
            symbol: sym.to_string(),
            price,
        })?;
        self.price_overrides.insert(sym, price);
        Ok(())
    }

    pub fn clear_price_overrides(&mut self) {
        self.price_overrides.clear();
    }

    pub fn price_overrides(&self) -> &BTreeMap<Symbol, Price> {
        &self.price_overrides
    }
}
