//! Property-based tests for precision handling and normalization

use perpbridge_core::precision::{
    decimals_in, format_with_decimals, increment_from_decimals, round_to_increment,
};
use perpbridge_exchanges::binance::types::{BinanceAdapter, BinanceSymbol};
use perpbridge_exchanges::bitmex::types::{BitmexAdapter, BitmexMargin};
use perpbridge_exchanges::prelude::*;

use proptest::prelude::*;

/// Tick and lot sizes seen on BitMEX instruments
const BITMEX_INCREMENTS: &[f64] = &[0.5, 0.05, 0.01, 0.0001, 1.0, 5.0, 100.0, 1000.0];

fn binance_symbol(price_precision: u32, quantity_precision: u32) -> BinanceSymbol {
    BinanceSymbol {
        symbol: "BTCUSDT".to_string(),
        pair: "BTCUSDT".to_string(),
        contract_type: "PERPETUAL".to_string(),
        status: "TRADING".to_string(),
        base_asset: "BTC".to_string(),
        quote_asset: "USDT".to_string(),
        price_precision,
        quantity_precision,
    }
}

fn margin(wallet_balance: i64) -> BitmexMargin {
    BitmexMargin {
        currency: "XBt".to_string(),
        init_margin: None,
        maint_margin: None,
        margin_balance: None,
        wallet_balance: Some(wallet_balance),
        unrealised_pnl: None,
    }
}

#[cfg(test)]
mod precision_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_rounding_is_idempotent(value in -1_000_000.0..1_000_000.0f64, decimals in 0u32..8) {
            let increment = increment_from_decimals(decimals);
            let once = round_to_increment(value, increment)?;
            let twice = round_to_increment(once, increment)?;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn test_rounding_moves_at_most_half_an_increment(
            value in 0.0..100_000.0f64,
            index in 0..BITMEX_INCREMENTS.len(),
        ) {
            let increment = BITMEX_INCREMENTS[index];
            let rounded = round_to_increment(value, increment)?;
            prop_assert!((rounded - value).abs() <= increment / 2.0 + 1e-9);
        }

        #[test]
        fn test_wire_format_respects_decimals(value in 0.0..100_000.0f64, decimals in 0u32..8) {
            let rounded = round_to_increment(value, increment_from_decimals(decimals))?;
            let wire = format_with_decimals(rounded, decimals);

            let fraction = wire.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
            prop_assert!(fraction <= decimals as usize, "{} has more than {} decimals", wire, decimals);
            prop_assert_eq!(wire.parse::<f64>().unwrap(), rounded);
        }

        #[test]
        fn test_decimals_in_inverts_increment(decimals in 0u32..12) {
            prop_assert_eq!(decimals_in(increment_from_decimals(decimals)), decimals);
        }
    }
}

#[cfg(test)]
mod normalization_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_binance_increments_follow_precision(price in 0u32..9, quantity in 0u32..9) {
            let contract = BinanceAdapter.parse_contract(&binance_symbol(price, quantity))?;

            let expected_tick: f64 = format!("1e-{price}").parse().unwrap();
            let expected_lot: f64 = format!("1e-{quantity}").parse().unwrap();
            prop_assert_eq!(contract.tick_size, expected_tick);
            prop_assert_eq!(contract.lot_size, expected_lot);
            prop_assert_eq!(decimals_in(contract.tick_size), contract.price_decimals);
            prop_assert_eq!(decimals_in(contract.lot_size), contract.quantity_decimals);
        }

        #[test]
        fn test_bitmex_satoshis_scale_linearly(a in 0i64..1_000_000_000_000, b in 0i64..1_000_000_000_000) {
            let sum = BitmexAdapter.parse_balance(&margin(a + b))?.wallet_balance;
            let parts = BitmexAdapter.parse_balance(&margin(a))?.wallet_balance
                + BitmexAdapter.parse_balance(&margin(b))?.wallet_balance;
            prop_assert!((sum - parts).abs() <= 1e-9 * sum.max(1.0));
        }

        #[test]
        fn test_bitmex_whole_coins(coins in 0i64..21_000_000) {
            let balance = BitmexAdapter.parse_balance(&margin(coins * 100_000_000))?;
            prop_assert!((balance.wallet_balance - coins as f64).abs() <= 1e-9 * (coins as f64).max(1.0));
            prop_assert_eq!(balance.margin_balance, 0.0);
        }

        #[test]
        fn test_cache_keeps_last_quote_per_side(
            updates in prop::collection::vec((prop::option::of(1.0..1e6f64), prop::option::of(1.0..1e6f64)), 1..50),
        ) {
            let cache = PriceCache::new();
            for (bid, ask) in &updates {
                cache.apply(&BookUpdate { symbol: "XBTUSD".to_string(), bid: *bid, ask: *ask });
            }

            let last_bid = updates.iter().rev().find_map(|(bid, _)| *bid);
            let last_ask = updates.iter().rev().find_map(|(_, ask)| *ask);
            let prices = cache.get("XBTUSD").unwrap();
            prop_assert_eq!(prices.bid, last_bid);
            prop_assert_eq!(prices.ask, last_ask);
        }
    }
}
