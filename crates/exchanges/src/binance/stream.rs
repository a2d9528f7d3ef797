//! Binance `bookTicker` stream protocol

use super::types::BinanceBookTickerEvent;
use crate::traits::StreamProtocol;
use crate::types::BookUpdate;
use perpbridge_core::SequenceGen;

use serde_json::json;
use tracing::debug;

/// One `SUBSCRIBE` carrying a `<symbol>@bookTicker` token per symbol
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceStream;

impl StreamProtocol for BinanceStream {
    const EXCHANGE: &'static str = "binance";

    fn subscribe_messages(&self, symbols: &[String], ids: &SequenceGen) -> Vec<String> {
        let params: Vec<String> = symbols
            .iter()
            .map(|symbol| format!("{}@bookTicker", symbol.to_lowercase()))
            .collect();

        let message = json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": ids.next(),
        });
        vec![message.to_string()]
    }

    fn parse_book_updates(&self, message: &str) -> Vec<BookUpdate> {
        let Ok(event) = serde_json::from_str::<BinanceBookTickerEvent>(message) else {
            return Vec::new();
        };
        if event.event_type != "bookTicker" {
            return Vec::new();
        }

        match (event.bid.parse::<f64>(), event.ask.parse::<f64>()) {
            (Ok(bid), Ok(ask)) => vec![BookUpdate {
                symbol: event.symbol,
                bid: Some(bid),
                ask: Some(ask),
            }],
            _ => {
                debug!(exchange = Self::EXCHANGE, "Unparseable bookTicker prices: {}", message);
                Vec::new()
            }
        }
    }
}
