//! Account-level aggregation.
//!
//! Cross margin means one wallet backs every group. The account view sums PnL
//! and maintenance margin across groups and compares them with the equity
//! left in the wallet.

use crate::group::{GroupKey, PositionGroup};
use crate::margin::{classify_margin_ratio, free_margin, margin_ratio_percent, MarginBands, MarginRiskBand};
use crate::types::{Price, Quote, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub wallet_balance: Quote,
    pub total_pnl: Quote,
    pub total_maintenance_margin: Quote,
    /// wallet + total pnl
    pub current_balance: Quote,
    /// Percent. 100 when the current balance is not positive.
    pub margin_ratio: Decimal,
    pub risk_band: MarginRiskBand,
    pub total_margin_used: Quote,
    /// Wallet minus initial margin posted across all groups.
    pub available_balance: Quote,
    /// Total PnL at which the account reaches the liquidation line.
    pub liquidation_pnl_threshold: Quote,
}

impl AccountSummary {
    pub fn is_at_liquidation_risk(&self) -> bool {
        self.risk_band == MarginRiskBand::LiquidationRisk
    }
}

pub fn compute_account_summary(
    groups: &BTreeMap<GroupKey, PositionGroup>,
    wallet_balance: Quote,
    current_prices: &BTreeMap<Symbol, Price>,
    bands: &MarginBands,
) -> AccountSummary {
    let total_pnl: Quote = groups
        .values()
        .map(|g| g.pnl(g.reference_price(current_prices)))
        .sum();
    let total_maintenance_margin: Quote = groups.values().map(|g| g.maintenance_margin).sum();
    let total_margin_used: Quote = groups.values().map(|g| g.total_margin).sum();

    let current_balance = wallet_balance.add(total_pnl);
    let margin_ratio = margin_ratio_percent(total_maintenance_margin, current_balance);

    AccountSummary {
        wallet_balance,
        total_pnl,
        total_maintenance_margin,
        current_balance,
        margin_ratio,
        risk_band: classify_margin_ratio(margin_ratio, bands),
        total_margin_used,
        available_balance: free_margin(wallet_balance, total_margin_used),
        liquidation_pnl_threshold: total_maintenance_margin.sub(wallet_balance),
    }
}
