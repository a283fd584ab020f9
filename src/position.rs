// 4.0: one user-entered position. immutable once built. pnl = quantity * (mark - entry) signed by side.
// 4.1 has the isolated-margin reference formula at the bottom.

use crate::types::{Leverage, MarginRate, Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// leverage choices the exchange UI offers
pub const ALLOWED_LEVERAGES: [u32; 11] = [1, 2, 3, 5, 10, 20, 25, 50, 75, 100, 125];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),

    #[error("entry price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("leverage {0}x is not in the allowed set")]
    LeverageNotAllowed(u32),

    #[error("notional size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("maintenance margin rate must be between 0 and 1, got {0}")]
    MarginRateOutOfRange(Decimal),

    #[error("size {notional} at entry {entry} is outside the representable range")]
    Overflow { entry: Decimal, notional: Decimal },
}

/// Raw position fields as a user (or a JSON file) supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInput {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub leverage: u32,
    pub notional_size: Decimal,
    pub maintenance_margin_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    symbol: Symbol,
    side: Side,
    entry_price: Price,
    leverage: Leverage,
    notional_size: Quote,
    maintenance_margin_rate: MarginRate,
    margin_used: Quote,
    quantity: Decimal,
}

impl Position {
    pub fn new(
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        leverage: u32,
        notional_size: Decimal,
        maintenance_margin_rate: Decimal,
    ) -> Result<Self, PositionError> {
        Self::with_allowed_leverages(
            symbol,
            side,
            entry_price,
            leverage,
            notional_size,
            maintenance_margin_rate,
            &ALLOWED_LEVERAGES,
        )
    }

    pub fn with_allowed_leverages(
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        leverage: u32,
        notional_size: Decimal,
        maintenance_margin_rate: Decimal,
        allowed_leverages: &[u32],
    ) -> Result<Self, PositionError> {
        let symbol =
            Symbol::new(symbol).ok_or_else(|| PositionError::InvalidSymbol(symbol.to_string()))?;
        let entry_price =
            Price::new(entry_price).ok_or(PositionError::NonPositivePrice(entry_price))?;
        if !allowed_leverages.contains(&leverage) {
            return Err(PositionError::LeverageNotAllowed(leverage));
        }
        let leverage = Leverage::new(leverage).ok_or(PositionError::LeverageNotAllowed(leverage))?;
        if notional_size <= Decimal::ZERO {
            return Err(PositionError::NonPositiveSize(notional_size));
        }
        let maintenance_margin_rate = MarginRate::new(maintenance_margin_rate)
            .ok_or(PositionError::MarginRateOutOfRange(maintenance_margin_rate))?;

        let overflow = || PositionError::Overflow {
            entry: entry_price.value(),
            notional: notional_size,
        };
        let margin_used = notional_size
            .checked_div(leverage.as_decimal())
            .map(Quote::new)
            .ok_or_else(overflow)?;
        let quantity = notional_size
            .checked_div(entry_price.value())
            .ok_or_else(overflow)?;
        // grouping weights entries by quantity
        entry_price
            .value()
            .checked_mul(quantity)
            .ok_or_else(overflow)?;

        Ok(Self {
            symbol,
            side,
            entry_price,
            leverage,
            notional_size: Quote::new(notional_size),
            maintenance_margin_rate,
            margin_used,
            quantity,
        })
    }

    pub fn from_input(input: &PositionInput, allowed_leverages: &[u32]) -> Result<Self, PositionError> {
        Self::with_allowed_leverages(
            &input.symbol,
            input.side,
            input.entry_price,
            input.leverage,
            input.notional_size,
            input.maintenance_margin_rate,
            allowed_leverages,
        )
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_price(&self) -> Price {
        self.entry_price
    }

    pub fn leverage(&self) -> Leverage {
        self.leverage
    }

    pub fn notional_size(&self) -> Quote {
        self.notional_size
    }

    pub fn maintenance_margin_rate(&self) -> MarginRate {
        self.maintenance_margin_rate
    }

    /// Collateral posted for this position: notional / leverage.
    pub fn margin_used(&self) -> Quote {
        self.margin_used
    }

    /// Base-asset quantity: notional / entry price.
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn maintenance_margin(&self) -> Quote {
        self.notional_size.mul(self.maintenance_margin_rate.value())
    }

    // 4.2: paper gains/losses at the given price
    pub fn unrealized_pnl(&self, current_price: Price) -> Quote {
        position_pnl(
            self.side,
            self.entry_price.value(),
            current_price.value(),
            self.quantity,
        )
    }

    pub fn price_change_percent(&self, current_price: Price) -> Decimal {
        let change = current_price.value() - self.entry_price.value();
        change
            .checked_div(self.entry_price.value())
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .unwrap_or(if change.is_sign_negative() { Decimal::MIN } else { Decimal::MAX })
    }

    pub fn individual_liquidation_price(&self) -> Price {
        individual_liquidation_price(
            self.side,
            self.entry_price,
            self.leverage,
            self.maintenance_margin_rate,
        )
    }
}

// 4.3: the pnl formula. same at position and group level.
pub fn position_pnl(
    side: Side,
    entry_price: Decimal,
    current_price: Decimal,
    quantity: Decimal,
) -> Quote {
    let pnl = match side {
        Side::Long => (current_price - entry_price).saturating_mul(quantity),
        Side::Short => (entry_price - current_price).saturating_mul(quantity),
    };
    Quote::new(pnl)
}

// 4.4: isolated-margin baseline. ignores every other position.
// mmr in (0, 1) keeps both multipliers strictly positive.
pub fn individual_liquidation_price(
    side: Side,
    entry_price: Price,
    leverage: Leverage,
    maintenance_margin_rate: MarginRate,
) -> Price {
    let imf = leverage.initial_margin_fraction();
    let mmr = maintenance_margin_rate.value();

    let liq_price = match side {
        Side::Long => entry_price.value().saturating_mul(Decimal::ONE - imf + mmr),
        Side::Short => entry_price.value().saturating_mul(Decimal::ONE + imf - mmr),
    };

    Price::new_unchecked(liq_price)
}
