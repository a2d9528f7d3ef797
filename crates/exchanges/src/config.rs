//! Exchange client configuration

use crate::errors::{ExchangeError, Result};
use serde::{Deserialize, Serialize};

const BINANCE_REST: &str = "https://fapi.binance.com";
const BINANCE_WS: &str = "wss://fstream.binance.com/ws";
const BINANCE_TESTNET_REST: &str = "https://testnet.binancefuture.com";
const BINANCE_TESTNET_WS: &str = "wss://stream.binancefuture.com/ws";

const BITMEX_REST: &str = "https://www.bitmex.com";
const BITMEX_WS: &str = "wss://ws.bitmex.com/realtime";
const BITMEX_TESTNET_REST: &str = "https://testnet.bitmex.com";
const BITMEX_TESTNET_WS: &str = "wss://ws.testnet.bitmex.com/realtime";

/// Configuration for one exchange client (REST + stream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
    pub base_url: String,
    pub ws_url: String,
    /// Symbols the price stream subscribes to. Updates for other symbols are dropped.
    pub symbols: Vec<String>,
    /// Per-request REST timeout
    pub timeout_ms: u64,
    /// Fixed cool-down between stream reconnects
    pub reconnect_delay_ms: u64,
    /// Stream keepalive interval. Three silent intervals drop the connection.
    pub heartbeat_ms: u64,
    /// Pin the stream thread to this core
    pub cpu_core: Option<usize>,
}

impl ExchangeConfig {
    /// Binance USDⓈ-M futures, production or testnet
    pub fn binance(testnet: bool) -> Self {
        let (base_url, ws_url) = if testnet {
            (BINANCE_TESTNET_REST, BINANCE_TESTNET_WS)
        } else {
            (BINANCE_REST, BINANCE_WS)
        };
        Self::with_endpoints(testnet, base_url, ws_url, "BTCUSDT")
    }

    /// BitMEX, production or testnet
    pub fn bitmex(testnet: bool) -> Self {
        let (base_url, ws_url) = if testnet {
            (BITMEX_TESTNET_REST, BITMEX_TESTNET_WS)
        } else {
            (BITMEX_REST, BITMEX_WS)
        };
        Self::with_endpoints(testnet, base_url, ws_url, "XBTUSD")
    }

    fn with_endpoints(testnet: bool, base_url: &str, ws_url: &str, symbol: &str) -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            testnet,
            base_url: base_url.to_string(),
            ws_url: ws_url.to_string(),
            symbols: vec![symbol.to_string()],
            timeout_ms: 5000,
            reconnect_delay_ms: 2000,
            heartbeat_ms: 10_000,
            cpu_core: None,
        }
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self.api_secret = api_secret.into();
        self
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Point REST and stream at other hosts (mock servers in tests)
    pub fn with_urls(mut self, base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, reconnect_delay_ms: u64) -> Self {
        self.reconnect_delay_ms = reconnect_delay_ms;
        self
    }

    pub fn with_heartbeat_ms(mut self, heartbeat_ms: u64) -> Self {
        self.heartbeat_ms = heartbeat_ms;
        self
    }

    pub fn with_cpu_core(mut self, core: Option<usize>) -> Self {
        self.cpu_core = core;
        self
    }

    /// Read `{PREFIX}_API_KEY` and `{PREFIX}_SECRET_KEY` from the environment
    pub fn with_env_credentials(mut self, prefix: &str) -> Result<Self> {
        let key_var = format!("{prefix}_API_KEY");
        let secret_var = format!("{prefix}_SECRET_KEY");

        self.api_key = std::env::var(&key_var)
            .map_err(|_| ExchangeError::MissingCredentials(key_var))?;
        self.api_secret = std::env::var(&secret_var)
            .map_err(|_| ExchangeError::MissingCredentials(secret_var))?;
        Ok(self)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}
