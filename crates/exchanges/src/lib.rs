//! # PerpBridge Exchange Connectors
//!
//! One client layer over Binance USDⓈ-M futures and BitMEX.
//!
//! ## Architecture
//!
//! - **monoio-native HTTP and WebSocket** - Plain TCP or rustls, no body on requests
//! - **Per-venue signing** - Binance query signatures, BitMEX expiry signatures
//! - **Normalized model** - `ExchangeAdapter` turns raw payloads into `Contract`,
//!   `Balance`, `Candle` and `OrderStatus`
//! - **Self-healing price stream** - Own thread, fixed cool-down reconnects,
//!   flume cancellation, mutex-guarded `PriceCache`
//! - **Facade** - `FuturesClient` per exchange
//!
//! REST failures never propagate: they are logged with method and endpoint
//! and surface as an empty collection or `None`.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod stream;
pub mod traits;
pub mod types;
pub mod websocket;

#[cfg(feature = "binance")]
pub mod binance;
#[cfg(feature = "bitmex")]
pub mod bitmex;

// Re-export main types
pub use cache::PriceCache;
pub use client::FuturesClient;
#[cfg(feature = "binance")]
pub use client::BinanceFuturesClient;
#[cfg(feature = "bitmex")]
pub use client::BitmexFuturesClient;
pub use config::ExchangeConfig;
pub use errors::{ExchangeError, Result};
pub use http::HttpMethod;
pub use stream::{ConnectionHealth, ConnectionState, StreamHandle, StreamingClient};
pub use traits::{ExchangeAdapter, RestApi, StreamProtocol};
pub use types::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::PriceCache;
    pub use crate::client::FuturesClient;
    #[cfg(feature = "binance")]
    pub use crate::client::BinanceFuturesClient;
    #[cfg(feature = "bitmex")]
    pub use crate::client::BitmexFuturesClient;
    pub use crate::config::ExchangeConfig;
    pub use crate::errors::{ExchangeError, Result};
    pub use crate::stream::{ConnectionHealth, ConnectionState};
    pub use crate::traits::{ExchangeAdapter, RestApi, StreamProtocol};
    pub use crate::types::*;
    pub use perpbridge_core::prelude::*;
}
