//! HMAC-SHA256 request signing shared by both venues

use crate::errors::{ExchangeError, Result};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API key pair
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
///
/// Deterministic for a given `(secret, payload)`. An empty secret is refused.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String> {
    if secret.is_empty() {
        return Err(ExchangeError::InvalidCredentials);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::SigningError(format!("HMAC setup failed: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Percent-encode `key=value` pairs in the order given
pub fn encode_query<K, V>(params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k.as_ref()), urlencoding::encode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}
