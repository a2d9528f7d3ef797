//! Binance USDⓈ-M futures wire types and their normalization

use crate::errors::{ExchangeError, Result};
use crate::traits::ExchangeAdapter;
use crate::types::{parse_f64, Balance, Candle, Contract, OrderStatus};
use perpbridge_core::precision::increment_from_decimals;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /fapi/v1/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSymbol {
    pub symbol: String,
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

/// `GET /fapi/v2/account`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccount {
    pub assets: Vec<BinanceAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAsset {
    pub asset: String,
    pub initial_margin: String,
    pub maint_margin: String,
    pub margin_balance: String,
    pub wallet_balance: String,
    pub unrealized_profit: String,
}

/// One kline: `[openTime, open, high, low, close, volume, closeTime, ...]`
pub type BinanceKline = Vec<Value>;

/// `GET /fapi/v1/ticker/bookTicker`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceBookTicker {
    pub symbol: String,
    pub bid_price: String,
    pub ask_price: String,
}

/// Order placement, cancel and query all answer with this shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrder {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(default = "zero")]
    pub avg_price: String,
}

fn zero() -> String {
    "0".to_string()
}

/// Stream `bookTicker` event
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceBookTickerEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid: String,
    #[serde(rename = "a")]
    pub ask: String,
}

/// Normalizes Binance payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceAdapter;

impl ExchangeAdapter for BinanceAdapter {
    type RawContract = BinanceSymbol;
    type RawBalance = BinanceAsset;
    type RawCandle = BinanceKline;
    type RawOrder = BinanceOrder;

    fn parse_contract(&self, raw: &BinanceSymbol) -> Result<Contract> {
        Ok(Contract {
            symbol: raw.symbol.clone(),
            base_asset: raw.base_asset.clone(),
            quote_asset: raw.quote_asset.clone(),
            price_decimals: raw.price_precision,
            quantity_decimals: raw.quantity_precision,
            tick_size: increment_from_decimals(raw.price_precision),
            lot_size: increment_from_decimals(raw.quantity_precision),
        })
    }

    fn parse_balance(&self, raw: &BinanceAsset) -> Result<Balance> {
        Ok(Balance {
            initial_margin: parse_f64(&raw.initial_margin, "initialMargin")?,
            maintenance_margin: parse_f64(&raw.maint_margin, "maintMargin")?,
            margin_balance: parse_f64(&raw.margin_balance, "marginBalance")?,
            wallet_balance: parse_f64(&raw.wallet_balance, "walletBalance")?,
            unrealized_pnl: parse_f64(&raw.unrealized_profit, "unrealizedProfit")?,
        })
    }

    fn parse_candle(&self, raw: &BinanceKline, _interval: &str) -> Result<Candle> {
        if raw.len() < 6 {
            return Err(ExchangeError::InvalidResponse(format!(
                "Kline has {} fields, expected at least 6",
                raw.len()
            )));
        }

        let timestamp = raw[0]
            .as_i64()
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("Invalid kline open time: {}", raw[0])))?;

        Ok(Candle {
            timestamp,
            open: kline_field(raw, 1, "open")?,
            high: kline_field(raw, 2, "high")?,
            low: kline_field(raw, 3, "low")?,
            close: kline_field(raw, 4, "close")?,
            volume: kline_field(raw, 5, "volume")?,
        })
    }

    fn parse_order_status(&self, raw: &BinanceOrder) -> Result<OrderStatus> {
        Ok(OrderStatus {
            order_id: raw.order_id.to_string(),
            status: raw.status.clone(),
            avg_price: parse_f64(&raw.avg_price, "avgPrice")?,
        })
    }
}

// Kline prices arrive as strings; accept bare numbers too.
fn kline_field(raw: &BinanceKline, index: usize, field: &str) -> Result<f64> {
    match &raw[index] {
        Value::String(s) => parse_f64(s, field),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("Invalid number in {field}: {n}"))),
        other => Err(ExchangeError::InvalidResponse(format!("Invalid {field}: {other}"))),
    }
}
