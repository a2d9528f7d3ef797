//! Exchange-specific error types
//!
//! Every internal step returns [`Result`]. The public REST operations never
//! surface these: they log them once and collapse to an empty/`None` result
//! (see [`log_and_discard`]).

use crate::http::HttpMethod;
use perpbridge_core::log_error;
use perpbridge_core::precision::PrecisionError;
use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Exchange operation errors
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Precision error: {0}")]
    PrecisionError(String),
}

impl From<PrecisionError> for ExchangeError {
    fn from(err: PrecisionError) -> Self {
        Self::PrecisionError(err.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for ExchangeError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Collapse a failed REST step into "no result", logging it once with
/// method and endpoint context.
pub(crate) fn log_and_discard<T>(
    exchange: &'static str,
    method: HttpMethod,
    endpoint: &str,
    result: Result<T>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log_error!(exchange, format!("{method} request to {endpoint}"), e);
            None
        }
    }
}
