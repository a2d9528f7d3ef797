//! Venue seams: payload normalization, REST operations, stream protocol
//!
//! Each exchange implements all three; the streaming client and the facade
//! are generic over them.

use crate::config::ExchangeConfig;
use crate::errors::Result;
use crate::types::*;
use perpbridge_core::SequenceGen;

use async_trait::async_trait;
use std::collections::HashMap;

/// Turns one exchange's raw wire records into the shared model
pub trait ExchangeAdapter {
    type RawContract;
    type RawBalance;
    type RawCandle;
    type RawOrder;

    fn parse_contract(&self, raw: &Self::RawContract) -> Result<Contract>;

    fn parse_balance(&self, raw: &Self::RawBalance) -> Result<Balance>;

    /// `interval` is the bar size the candle was requested with
    fn parse_candle(&self, raw: &Self::RawCandle, interval: &str) -> Result<Candle>;

    fn parse_order_status(&self, raw: &Self::RawOrder) -> Result<OrderStatus>;
}

/// REST operations of one exchange.
///
/// None of these fail: transport errors and non-200 responses are logged
/// with method and endpoint, then surface as an empty collection or `None`.
#[async_trait(?Send)]
pub trait RestApi: Sized {
    /// Value of the `exchange` field on every log event
    const EXCHANGE: &'static str;

    /// Production or testnet endpoints with this venue's defaults
    fn default_config(testnet: bool) -> ExchangeConfig;

    fn new(config: &ExchangeConfig) -> Result<Self>;

    async fn get_contracts(&self) -> HashMap<String, Contract>;

    async fn get_balances(&self) -> HashMap<String, Balance>;

    /// One page of history, oldest first
    async fn get_historical_candles(&self, contract: &Contract, interval: &str) -> Vec<Candle>;

    async fn get_book_ticker(&self, contract: &Contract) -> Option<BidAsk>;

    /// Quantity and price are snapped to the contract's lot and tick before signing
    async fn place_order(&self, contract: &Contract, order: &OrderRequest) -> Option<OrderStatus>;

    async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus>;

    async fn get_order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus>;
}

/// Wire protocol of one exchange's top-of-book stream
pub trait StreamProtocol: Default + Send + 'static {
    const EXCHANGE: &'static str;

    /// Messages to send right after every (re)connect
    fn subscribe_messages(&self, symbols: &[String], ids: &SequenceGen) -> Vec<String>;

    /// Book updates carried by one inbound message; empty for anything else
    fn parse_book_updates(&self, message: &str) -> Vec<BookUpdate>;

    /// Application-level keepalive text. `None` sends a WebSocket ping frame instead.
    fn heartbeat_message(&self) -> Option<String> {
        None
    }
}
