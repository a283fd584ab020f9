//! Cross-Margin Calculator report.
//!
//! Loads positions (from `POSITIONS_FILE` or a built-in example set), pulls
//! mark prices once, and prints the grouped cross-margin view, the account
//! summary, the risk ranking and the isolated-margin comparison.

use std::collections::BTreeMap;

use anyhow::Context;
use cross_margin_calc::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = CalculatorConfig::from_env()?;
    let feed = BinancePriceFeed::new(config.price_feed.clone())?;
    let mut feed = CachedPriceFeed::new(feed, config.price_feed.cache_ttl_secs);
    let mut session = Session::new(config)?;

    match std::env::var("POSITIONS_FILE") {
        Ok(path) => load_positions(&mut session, &path)?,
        Err(_) => add_example_positions(&mut session, &mut feed)?,
    }

    let result = session.refresh_and_evaluate(&mut feed, Timestamp::now());
    print_prices(&result.prices);
    print_report(&session, &result.evaluation);

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}

fn load_positions(session: &mut Session, path: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let inputs: Vec<PositionInput> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    for input in &inputs {
        session.add_position(input)?;
    }
    tracing::info!(count = inputs.len(), path, "positions loaded");
    Ok(())
}

/// BTC long 10x $500, ETH short 5x $300, ADA long 20x $200, entered at the current price.
fn add_example_positions<F: PriceFeed>(
    session: &mut Session,
    feed: &mut CachedPriceFeed<F>,
) -> anyhow::Result<()> {
    let examples = [
        ("BTCUSDT", Side::Long, 10, dec!(500)),
        ("ETHUSDT", Side::Short, 5, dec!(300)),
        ("ADAUSDT", Side::Long, 20, dec!(200)),
    ];

    let symbols = examples.iter().filter_map(|(s, ..)| Symbol::new(s)).collect();
    let live = feed.get_prices(&symbols).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "using fallback prices for example entries");
        session.config().fallback_prices.clone()
    });

    for (symbol, side, leverage, size) in examples {
        let entry = Symbol::new(symbol)
            .and_then(|s| live.get(&s).copied())
            .map(|p| p.value())
            .unwrap_or(Decimal::ONE);
        session.open(symbol, side, entry, leverage, size, dec!(0.005))?;
    }
    Ok(())
}

fn print_prices(prices: &BTreeMap<Symbol, ResolvedPrice>) {
    println!("Prices\n");
    for (symbol, resolved) in prices {
        println!("  {:<16} {:>18} ({:?})", symbol, resolved.price, resolved.source);
    }
    println!();
}

fn print_report(session: &Session, eval: &Evaluation) {
    if eval.groups.is_empty() {
        println!("No positions. Add some to calculate PnL and liquidation prices.");
        return;
    }

    let acc = &eval.account;
    println!("Account\n");
    println!("  Wallet balance:           {}", acc.wallet_balance.value().round_dp(2));
    println!("  Total margin used:        {}", acc.total_margin_used.value().round_dp(2));
    println!("  Available balance:        {}", acc.available_balance.value().round_dp(2));
    println!("  Total PnL:                {}", acc.total_pnl.value().round_dp(2));
    println!("  Total maintenance margin: {}", acc.total_maintenance_margin.value().round_dp(2));
    println!("  Current balance:          {}", acc.current_balance.value().round_dp(2));
    println!("  Margin ratio:             {}%", acc.margin_ratio.round_dp(1));
    println!("  Liquidation PnL threshold: {}", acc.liquidation_pnl_threshold.value().round_dp(2));
    match acc.risk_band {
        MarginRiskBand::LiquidationRisk => println!("  LIQUIDATION RISK: margin ratio at or above 100%"),
        MarginRiskBand::HighRisk => println!("  HIGH RISK: margin ratio approaching liquidation"),
        MarginRiskBand::Normal => {}
    }

    println!("\nGrouped positions (cross margin)\n");
    println!(
        "  {:<16} {:<6} {:>3} {:>12} {:>16} {:>7} {:>16} {:>16} {:>9} {:>12}",
        "symbol", "side", "n", "size", "avg entry", "lev", "current", "liq price", "dist %", "pnl"
    );
    for g in &eval.groups {
        println!(
            "  {:<16} {:<6} {:>3} {:>12} {:>16} {:>6}x {:>16} {:>16} {:>9} {:>12}{}",
            g.key.symbol,
            g.key.side,
            g.position_count,
            g.total_notional.value().round_dp(2),
            g.weighted_entry_price.round_dp(6),
            g.avg_leverage.round_dp(1),
            g.current_price.round_dp(6),
            g.liquidation_price.round_dp(6),
            g.distance_to_liquidation_pct.round_dp(2),
            g.pnl.value().round_dp(2),
            if g.degenerate { "  (no realistic liquidation price)" } else { "" },
        );
    }

    if eval.has_interactions() {
        println!("\nCross margin interactions\n");
        for g in &eval.groups {
            let verb = match g.pnl_impact() {
                PnlImpact::Helping => "helping",
                PnlImpact::Hurting => "hurting",
                PnlImpact::Neutral => "neutral to",
            };
            println!(
                "  {} {}: {} other positions (PnL {})",
                g.key.symbol,
                g.key.side,
                verb,
                g.pnl.value().round_dp(2)
            );
        }
    }

    println!("\nLiquidation risk ranking (closest first)\n");
    for ranked in eval.risk_ranking(&session.config().distance_bands) {
        let label = match ranked.risk_level {
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        };
        println!(
            "  {:<6} {} {}: {}% to liquidation",
            label,
            ranked.result.key.symbol,
            ranked.result.key.side,
            ranked.result.distance_to_liquidation_pct.round_dp(2)
        );
    }

    println!("\nIndividual positions (isolated reference)\n");
    for p in &eval.individual {
        println!(
            "  #{:<3} {:<16} {:<6} entry {:>14} {:>5} size {:>10} margin {:>10} pnl {:>10} ({}%) iso liq {:>14}",
            p.position_id,
            p.symbol,
            p.side,
            p.entry_price.value().round_dp(6),
            p.leverage,
            p.notional_size.value().round_dp(2),
            p.margin_used.value().round_dp(2),
            p.pnl.value().round_dp(2),
            p.price_change_pct.round_dp(2),
            p.individual_liquidation_price.value().round_dp(6),
        );
    }
}
