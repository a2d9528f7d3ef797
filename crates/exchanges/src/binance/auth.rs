//! Binance request signing
//!
//! Parameters (plus a millisecond `timestamp`) are percent-encoded in key
//! order, HMAC-SHA256-signed, and `signature=<hex>` is appended. The result
//! is the exact query string put on the URL for every verb.

use crate::auth::{encode_query, hmac_sha256_hex, Credentials};
use crate::errors::{ExchangeError, Result};
use perpbridge_core::prelude::*;

use std::collections::BTreeMap;
use tracing::debug;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance request signer
#[derive(Debug, Clone)]
pub struct BinanceSigner {
    credentials: Credentials,
}

impl BinanceSigner {
    pub fn new(credentials: Credentials) -> Result<Self> {
        if !credentials.is_valid() {
            return Err(ExchangeError::InvalidCredentials);
        }
        Ok(Self { credentials })
    }

    /// Signed query string stamped with the current time
    pub fn sign_query(&self, params: BTreeMap<&str, String>) -> Result<String> {
        self.sign_query_at(params, millis())
    }

    /// Signed query string for a fixed `timestamp` (ms)
    pub fn sign_query_at(&self, mut params: BTreeMap<&str, String>, timestamp: u64) -> Result<String> {
        params.insert("timestamp", timestamp.to_string());

        let query = encode_query(&params);
        let signature = hmac_sha256_hex(&self.credentials.api_secret, &query)?;
        debug!(exchange = "binance", "🔐 Signed query: {}", query);

        Ok(format!("{query}&signature={signature}"))
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![(API_KEY_HEADER, self.credentials.api_key.clone())]
    }
}
