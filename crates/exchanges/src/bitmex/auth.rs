//! BitMEX request signing
//!
//! `signature = hex(HMAC_SHA256(secret, VERB + path[?query] + expires))`.
//! The query must be byte-identical to the one sent on the URL.

use crate::auth::{hmac_sha256_hex, Credentials};
use crate::errors::{ExchangeError, Result};
use crate::http::HttpMethod;
use perpbridge_core::prelude::*;

/// Seconds a signed request stays valid
pub const EXPIRY_SKEW_SECS: u64 = 5;

/// BitMEX request signer
#[derive(Debug, Clone)]
pub struct BitmexSigner {
    credentials: Credentials,
}

impl BitmexSigner {
    pub fn new(credentials: Credentials) -> Result<Self> {
        if !credentials.is_valid() {
            return Err(ExchangeError::InvalidCredentials);
        }
        Ok(Self { credentials })
    }

    /// Auth headers for a request expiring a few seconds from now
    pub fn sign(&self, method: HttpMethod, path: &str, query: &str) -> Result<Vec<(&'static str, String)>> {
        self.sign_with_expiry(method, path, query, secs() + EXPIRY_SKEW_SECS)
    }

    pub fn sign_with_expiry(
        &self,
        method: HttpMethod,
        path: &str,
        query: &str,
        expires: u64,
    ) -> Result<Vec<(&'static str, String)>> {
        let message = if query.is_empty() {
            format!("{}{}{}", method.as_str(), path, expires)
        } else {
            format!("{}{}?{}{}", method.as_str(), path, query, expires)
        };
        let signature = hmac_sha256_hex(&self.credentials.api_secret, &message)?;

        Ok(vec![
            ("api-key", self.credentials.api_key.clone()),
            ("api-expires", expires.to_string()),
            ("api-signature", signature),
        ])
    }
}
