//! BitMEX wire types and their normalization
//!
//! BitMEX reports raw tick/lot sizes rather than decimal counts, margins in
//! satoshis, and candle times as ISO-8601 bin *close* times.

use crate::errors::{ExchangeError, Result};
use crate::traits::ExchangeAdapter;
use crate::types::{interval_millis, Balance, Candle, Contract, OrderStatus};
use perpbridge_core::precision::decimals_in;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Satoshi to whole-currency factor
pub const BITMEX_MULTIPLIER: f64 = 0.000_000_01;

/// One `instrument` row, from REST or from the stream.
///
/// Stream updates carry only the fields that changed, so everything but the
/// symbol is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexInstrument {
    pub symbol: String,
    #[serde(default)]
    pub root_symbol: Option<String>,
    #[serde(default)]
    pub quote_currency: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tick_size: Option<f64>,
    #[serde(default)]
    pub lot_size: Option<f64>,
    #[serde(default)]
    pub bid_price: Option<f64>,
    #[serde(default)]
    pub ask_price: Option<f64>,
}

/// `GET /api/v1/user/margin` row, amounts in satoshis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexMargin {
    pub currency: String,
    #[serde(default)]
    pub init_margin: Option<i64>,
    #[serde(default)]
    pub maint_margin: Option<i64>,
    #[serde(default)]
    pub margin_balance: Option<i64>,
    #[serde(default)]
    pub wallet_balance: Option<i64>,
    #[serde(default)]
    pub unrealised_pnl: Option<i64>,
}

/// `GET /api/v1/trade/bucketed` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitmexBucket {
    pub timestamp: String,
    pub symbol: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Order as returned by every `/api/v1/order` verb
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexOrder {
    #[serde(rename = "orderID")]
    pub order_id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub ord_status: String,
    #[serde(default)]
    pub avg_px: Option<f64>,
}

fn satoshis(value: Option<i64>) -> f64 {
    value.unwrap_or(0) as f64 * BITMEX_MULTIPLIER
}

fn required<T: Copy>(value: Option<T>, field: &str, symbol: &str) -> Result<T> {
    value.ok_or_else(|| ExchangeError::InvalidResponse(format!("{symbol}: missing {field}")))
}

/// Normalizes BitMEX payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmexAdapter;

impl ExchangeAdapter for BitmexAdapter {
    type RawContract = BitmexInstrument;
    type RawBalance = BitmexMargin;
    type RawCandle = BitmexBucket;
    type RawOrder = BitmexOrder;

    fn parse_contract(&self, raw: &BitmexInstrument) -> Result<Contract> {
        let tick_size = required(raw.tick_size, "tickSize", &raw.symbol)?;
        let lot_size = required(raw.lot_size, "lotSize", &raw.symbol)?;
        let missing = |field: &str| ExchangeError::InvalidResponse(format!("{}: missing {field}", raw.symbol));

        Ok(Contract {
            symbol: raw.symbol.clone(),
            base_asset: raw.root_symbol.clone().ok_or_else(|| missing("rootSymbol"))?,
            quote_asset: raw.quote_currency.clone().ok_or_else(|| missing("quoteCurrency"))?,
            price_decimals: decimals_in(tick_size),
            quantity_decimals: decimals_in(lot_size),
            tick_size,
            lot_size,
        })
    }

    fn parse_balance(&self, raw: &BitmexMargin) -> Result<Balance> {
        Ok(Balance {
            initial_margin: satoshis(raw.init_margin),
            maintenance_margin: satoshis(raw.maint_margin),
            margin_balance: satoshis(raw.margin_balance),
            wallet_balance: satoshis(raw.wallet_balance),
            unrealized_pnl: satoshis(raw.unrealised_pnl),
        })
    }

    /// Shifts the bin's close time back one interval to its open time
    fn parse_candle(&self, raw: &BitmexBucket, interval: &str) -> Result<Candle> {
        let close_time = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|e| ExchangeError::InvalidResponse(format!("Invalid timestamp {:?}: {e}", raw.timestamp)))?;

        Ok(Candle {
            timestamp: close_time.timestamp_millis() - interval_millis(interval)?,
            open: required(raw.open, "open", &raw.symbol)?,
            high: required(raw.high, "high", &raw.symbol)?,
            low: required(raw.low, "low", &raw.symbol)?,
            close: required(raw.close, "close", &raw.symbol)?,
            volume: raw.volume.unwrap_or(0.0),
        })
    }

    fn parse_order_status(&self, raw: &BitmexOrder) -> Result<OrderStatus> {
        Ok(OrderStatus {
            order_id: raw.order_id.clone(),
            status: raw.ord_status.clone(),
            avg_price: raw.avg_px.unwrap_or(0.0),
        })
    }
}
