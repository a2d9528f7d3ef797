//! BitMEX perpetuals
//!
//! REST client, expiry-based request signer, `instrument` stream protocol
//! and the adapter that turns BitMEX payloads into the shared model.

pub mod auth;
pub mod rest;
pub mod stream;
pub mod types;

pub use auth::BitmexSigner;
pub use rest::BitmexRestClient;
pub use stream::BitmexStream;
pub use types::{BitmexAdapter, BITMEX_MULTIPLIER};
