//! Property-based tests for the margin and liquidation math.
//!
//! These tests verify invariants hold under random inputs.

use cross_margin_calc::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn notional_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|x| Decimal::new(x, 1)) // $0.1 to $10,000
}

fn leverage_strategy() -> impl Strategy<Value = u32> {
    prop::sample::select(ALLOWED_LEVERAGES.to_vec())
}

fn mmr_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100i64).prop_map(|x| Decimal::new(x, 3)) // 0.1% to 10%
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn symbol_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"])
}

fn position_strategy() -> impl Strategy<Value = Position> {
    (
        symbol_strategy(),
        side_strategy(),
        price_strategy(),
        leverage_strategy(),
        notional_strategy(),
        mmr_strategy(),
    )
        .prop_map(|(symbol, side, entry, leverage, notional, mmr)| {
            Position::new(symbol, side, entry, leverage, notional, mmr).unwrap()
        })
}

fn close(a: Decimal, b: Decimal) -> bool {
    let tolerance = dec!(0.000001) * (Decimal::ONE + a.abs().max(b.abs()));
    (a - b).abs() <= tolerance
}

fn single(
    side: Side,
    entry: Decimal,
    leverage: u32,
    notional: Decimal,
    mmr: Decimal,
    wallet: Decimal,
) -> GroupLiquidation {
    let pos = Position::new("BTCUSDT", side, entry, leverage, notional, mmr).unwrap();
    let groups = group_positions(&[pos]);
    compute_liquidation(&groups, Quote::new(wallet), &BTreeMap::new())
        .pop()
        .unwrap()
}

proptest! {
    /// Margin and quantity derive from the notional: margin * leverage and
    /// quantity * entry both give the notional back.
    #[test]
    fn margin_and_quantity_recover_notional(
        entry in price_strategy(),
        leverage in leverage_strategy(),
        notional in notional_strategy(),
        mmr in mmr_strategy(),
    ) {
        let pos = Position::new("BTCUSDT", Side::Long, entry, leverage, notional, mmr).unwrap();

        prop_assert!(close(pos.margin_used().value() * Decimal::from(leverage), notional));
        prop_assert!(close(pos.quantity() * entry, notional));
        prop_assert!(pos.maintenance_margin().value() < notional);
    }

    /// Unrealized PnL is zero when current = entry
    #[test]
    fn pnl_zero_at_entry(pos in position_strategy()) {
        prop_assert_eq!(pos.unrealized_pnl(pos.entry_price()).value(), Decimal::ZERO);
    }

    /// A 10% move up is worth the same to a long as a 10% move down is to a short.
    #[test]
    fn pnl_symmetric_between_sides(
        entry in price_strategy(),
        notional in notional_strategy(),
    ) {
        let long = Position::new("BTCUSDT", Side::Long, entry, 10, notional, dec!(0.005)).unwrap();
        let short = Position::new("BTCUSDT", Side::Short, entry, 10, notional, dec!(0.005)).unwrap();

        let up = Price::new_unchecked(entry * dec!(1.1));
        let long_pnl = long.unrealized_pnl(up).value();
        let short_pnl = short.unrealized_pnl(up).value();

        prop_assert!(long_pnl > Decimal::ZERO);
        prop_assert_eq!(long_pnl, -short_pnl);
        prop_assert!(close(long_pnl, notional * dec!(0.1)));
    }

    /// Grouping does not depend on the order positions were entered in.
    #[test]
    fn grouping_is_order_independent(
        positions in prop::collection::vec(position_strategy(), 1..12),
    ) {
        let forward = group_positions(&positions);
        let mut reversed_input = positions.clone();
        reversed_input.reverse();
        let reversed = group_positions(&reversed_input);

        prop_assert_eq!(forward.len(), reversed.len());
        for (key, a) in &forward {
            let b = &reversed[key];
            prop_assert_eq!(a.position_count, b.position_count);
            prop_assert!(close(a.total_notional.value(), b.total_notional.value()));
            prop_assert!(close(a.total_quantity, b.total_quantity));
            prop_assert!(close(a.weighted_entry_price, b.weighted_entry_price));
            prop_assert!(close(a.maintenance_margin.value(), b.maintenance_margin.value()));
        }

        let total: usize = forward.values().map(|g| g.position_count).sum();
        prop_assert_eq!(total, positions.len());
    }

    /// With one group nothing else shares the wallet, so the liquidation
    /// price is entry shifted by (wallet - mm) / qty.
    #[test]
    fn single_group_uses_whole_wallet(
        side in side_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
        notional in notional_strategy(),
        wallet in notional_strategy(),
    ) {
        let result = single(side, entry, leverage, notional, dec!(0.005), wallet);

        prop_assert_eq!(result.other_pnl, Quote::zero());
        prop_assert_eq!(result.other_maintenance_margin, Quote::zero());
        prop_assert_eq!(result.available_balance.value(), wallet);

        if !result.degenerate {
            let buffer = (wallet - result.maintenance_margin.value()) / result.total_quantity;
            let expected = match side {
                Side::Long => result.weighted_entry_price - buffer,
                Side::Short => result.weighted_entry_price + buffer,
            };
            prop_assert_eq!(result.liquidation_price, expected);
        }
    }

    /// More wallet pushes liquidation away: lower for longs, higher for shorts.
    #[test]
    fn wallet_monotonicity(
        side in side_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
        notional in notional_strategy(),
        wallet in notional_strategy(),
        extra in notional_strategy(),
    ) {
        let small = single(side, entry, leverage, notional, dec!(0.005), wallet);
        let large = single(side, entry, leverage, notional, dec!(0.005), wallet + extra);

        if !small.degenerate && !large.degenerate {
            match side {
                Side::Long => prop_assert!(large.liquidation_price < small.liquidation_price),
                Side::Short => prop_assert!(large.liquidation_price > small.liquidation_price),
            }
        }
    }

    /// The liquidation price is always positive, and a clamped long sits at
    /// 1% of entry.
    #[test]
    fn liquidation_price_positive(
        side in side_strategy(),
        entry in price_strategy(),
        leverage in leverage_strategy(),
        notional in notional_strategy(),
        wallet in notional_strategy(),
    ) {
        let result = single(side, entry, leverage, notional, dec!(0.005), wallet);

        prop_assert!(result.liquidation_price > Decimal::ZERO);
        if result.degenerate {
            let expected = match side {
                Side::Long => result.weighted_entry_price * LONG_CLAMP_FACTOR,
                Side::Short => result.weighted_entry_price * SHORT_CLAMP_FACTOR,
            };
            prop_assert_eq!(result.liquidation_price, expected);
        }
    }

    /// A wallet well above notional can never liquidate a long above zero.
    #[test]
    fn overfunded_long_is_degenerate(
        entry in price_strategy(),
        notional in notional_strategy(),
    ) {
        let result = single(Side::Long, entry, 1, notional, dec!(0.005), notional * dec!(2));

        prop_assert!(result.degenerate);
        prop_assert_eq!(result.liquidation_price, result.weighted_entry_price * dec!(0.01));
        prop_assert!(close(result.liquidation_price, entry * dec!(0.01)));
    }

    /// Ranking always orders by ascending distance.
    #[test]
    fn ranking_is_sorted(
        positions in prop::collection::vec(position_strategy(), 1..12),
        wallet in notional_strategy(),
    ) {
        let groups = group_positions(&positions);
        let results = compute_liquidation(&groups, Quote::new(wallet), &BTreeMap::new());
        let ranked = rank_by_risk(&results, &DistanceBands::default());

        prop_assert_eq!(ranked.len(), results.len());
        for pair in ranked.windows(2) {
            prop_assert!(
                pair[0].result.distance_to_liquidation_pct <= pair[1].result.distance_to_liquidation_pct
            );
        }
    }

    /// The margin ratio saturates at 100% once equity is gone.
    #[test]
    fn margin_ratio_saturates(
        mm in notional_strategy(),
        deficit in 0i64..100_000i64,
    ) {
        let balance = Quote::new(Decimal::new(-deficit, 2));
        prop_assert_eq!(margin_ratio_percent(Quote::new(mm), balance), dec!(100));
    }
}
