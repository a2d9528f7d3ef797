//! Binance USDⓈ-M futures
//!
//! REST client, request signer, `bookTicker` stream protocol and the
//! adapter that turns Binance payloads into the shared model.

pub mod auth;
pub mod rest;
pub mod stream;
pub mod types;

pub use auth::BinanceSigner;
pub use rest::BinanceRestClient;
pub use stream::BinanceStream;
pub use types::BinanceAdapter;
