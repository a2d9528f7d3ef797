//! Exchange-agnostic data model
//!
//! Every venue adapter produces these types; nothing above the adapters ever
//! sees a raw exchange payload.

use crate::errors::{ExchangeError, Result};
use perpbridge_core::precision::{format_with_decimals, round_to_increment};
use serde::{Deserialize, Serialize};

/// One tradable instrument.
///
/// Built once from the contracts listing and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    /// Smallest price increment
    pub tick_size: f64,
    /// Smallest quantity increment
    pub lot_size: f64,
}

impl Contract {
    /// Snap a price to the nearest tick
    pub fn round_price(&self, price: f64) -> Result<f64> {
        Ok(round_to_increment(price, self.tick_size)?)
    }

    /// Snap a quantity to the nearest lot
    pub fn round_quantity(&self, quantity: f64) -> Result<f64> {
        Ok(round_to_increment(quantity, self.lot_size)?)
    }

    /// Rounded price as it goes on the wire
    pub fn wire_price(&self, price: f64) -> Result<String> {
        Ok(format_with_decimals(self.round_price(price)?, self.price_decimals))
    }

    /// Rounded quantity as it goes on the wire
    pub fn wire_quantity(&self, quantity: f64) -> Result<String> {
        Ok(format_with_decimals(self.round_quantity(quantity)?, self.quantity_decimals))
    }
}

/// Margin snapshot for one asset, in whole units of that asset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub initial_margin: f64,
    pub maintenance_margin: f64,
    pub margin_balance: f64,
    pub wallet_balance: f64,
    pub unrealized_pnl: f64,
}

/// One OHLCV bar. `timestamp` is the bar's open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Result of placing, cancelling or querying an order.
///
/// `status` keeps the exchange's own vocabulary (`NEW`, `New`, `FILLED`,
/// `Filled`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub status: String,
    /// Zero while unfilled
    pub avg_price: f64,
}

/// Top of book for one symbol. A side stays `None` until first seen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BidAsk {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// One decoded top-of-book update, possibly carrying only one side
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub symbol: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Order parameters in the target exchange's own vocabulary.
///
/// Binance expects `BUY`/`LIMIT`/`GTC`, BitMEX `Buy`/`Limit`/`GoodTillCancel`.
/// Nothing here translates between them.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: String,
    pub quantity: f64,
    pub order_type: String,
    pub price: Option<f64>,
    pub time_in_force: Option<String>,
}

impl OrderRequest {
    pub fn new(side: impl Into<String>, quantity: f64, order_type: impl Into<String>) -> Self {
        Self {
            side: side.into(),
            quantity,
            order_type: order_type.into(),
            price: None,
            time_in_force: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_time_in_force(mut self, tif: impl Into<String>) -> Self {
        self.time_in_force = Some(tif.into());
        self
    }
}

/// Bar length of an interval token (`1m`, `5m`, `1h`, `1d`, `1w`) in milliseconds
pub fn interval_millis(interval: &str) -> Result<i64> {
    let invalid = || ExchangeError::InvalidResponse(format!("Unsupported interval: {interval}"));

    let split = interval.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (count, unit) = interval.split_at(split);
    let count: i64 = count.parse().map_err(|_| invalid())?;

    let unit_millis = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        _ => return Err(invalid()),
    };
    Ok(count * unit_millis)
}

/// Parse a decimal string field
pub(crate) fn parse_f64(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ExchangeError::InvalidResponse(format!("Invalid number in {field}: {value:?}")))
}
