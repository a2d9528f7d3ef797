//! BitMEX `instrument` table stream protocol

use super::types::BitmexInstrument;
use crate::traits::StreamProtocol;
use crate::types::BookUpdate;
use perpbridge_core::SequenceGen;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const INSTRUMENT_TABLE: &str = "instrument";
/// BitMEX answers a text `ping` with `pong`
const KEEPALIVE: &str = "ping";

#[derive(Debug, Deserialize)]
struct TableMessage {
    table: String,
    #[serde(default)]
    data: Vec<Value>,
}

/// One subscription to the `instrument` topic covers every symbol; the
/// streaming client keeps only rows for its configured symbols.
///
/// BitMEX has no request ids; one is still drawn per subscribe and logged so
/// both venues trace the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmexStream;

impl StreamProtocol for BitmexStream {
    const EXCHANGE: &'static str = "bitmex";

    fn subscribe_messages(&self, symbols: &[String], ids: &SequenceGen) -> Vec<String> {
        let id = ids.next();
        debug!(exchange = Self::EXCHANGE, "Subscribe #{} to {} for {:?}", id, INSTRUMENT_TABLE, symbols);

        vec![json!({ "op": "subscribe", "args": [INSTRUMENT_TABLE] }).to_string()]
    }

    fn parse_book_updates(&self, message: &str) -> Vec<BookUpdate> {
        let Ok(table) = serde_json::from_str::<TableMessage>(message) else {
            return Vec::new();
        };
        if table.table != INSTRUMENT_TABLE {
            return Vec::new();
        }

        table
            .data
            .into_iter()
            .filter_map(|row| serde_json::from_value::<BitmexInstrument>(row).ok())
            .filter(|row| row.bid_price.is_some() || row.ask_price.is_some())
            .map(|row| BookUpdate {
                symbol: row.symbol,
                bid: row.bid_price,
                ask: row.ask_price,
            })
            .collect()
    }

    fn heartbeat_message(&self) -> Option<String> {
        Some(KEEPALIVE.to_string())
    }
}
