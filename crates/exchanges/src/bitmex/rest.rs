//! BitMEX REST client
//!
//! Instrument and bucketed-trade reads are public; margin and order
//! endpoints are signed over `VERB + path?query + expires`. Parameters keep
//! the order the caller builds them in, and the signed query is the one sent.

use super::auth::BitmexSigner;
use super::types::*;
use crate::auth::{encode_query, Credentials};
use crate::config::ExchangeConfig;
use crate::errors::{log_and_discard, ExchangeError, Result};
use crate::http::{HttpClient, HttpMethod};
use crate::traits::{ExchangeAdapter, RestApi};
use crate::types::*;
use perpbridge_core::log_order;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const INSTRUMENTS_ACTIVE: &str = "/api/v1/instrument/active";
const INSTRUMENT: &str = "/api/v1/instrument";
const MARGIN: &str = "/api/v1/user/margin";
const TRADE_BUCKETED: &str = "/api/v1/trade/bucketed";
const ORDER: &str = "/api/v1/order";

/// Buckets returned per call; there is no paging
pub const BUCKET_COUNT: u32 = 500;

/// BitMEX REST client
pub struct BitmexRestClient {
    base_url: Url,
    http: HttpClient,
    signer: Option<BitmexSigner>,
    adapter: BitmexAdapter,
}

impl BitmexRestClient {
    fn endpoint_url(&self, endpoint: &str, query: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(endpoint);
        if !query.is_empty() {
            url.set_query(Some(query));
        }
        url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T> {
        let query = encode_query(params.iter().map(|(k, v)| (*k, v)));

        let headers = if signed {
            let signer = self
                .signer
                .as_ref()
                .ok_or_else(|| ExchangeError::MissingCredentials("BitMEX API key and secret".to_string()))?;
            debug!(exchange = Self::EXCHANGE, "📡 {} {} (signed)", method, endpoint);
            signer.sign(method, endpoint, &query)?
        } else {
            Vec::new()
        };

        let url = self.endpoint_url(endpoint, &query);
        let body = self
            .http
            .request(method, &url, &headers)
            .await?
            .into_ok_body()?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn public_get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T> {
        self.request(HttpMethod::Get, endpoint, params, false).await
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.request(method, endpoint, params, true).await
    }
}

#[async_trait(?Send)]
impl RestApi for BitmexRestClient {
    const EXCHANGE: &'static str = "bitmex";

    fn default_config(testnet: bool) -> ExchangeConfig {
        ExchangeConfig::bitmex(testnet)
    }

    fn new(config: &ExchangeConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let signer = if config.has_credentials() {
            Some(BitmexSigner::new(Credentials::new(&config.api_key, &config.api_secret))?)
        } else {
            None
        };

        info!(exchange = Self::EXCHANGE, "🔗 BitMEX REST client created for {}", base_url);

        Ok(Self {
            base_url,
            http: HttpClient::new(Duration::from_millis(config.timeout_ms)),
            signer,
            adapter: BitmexAdapter,
        })
    }

    async fn get_contracts(&self) -> HashMap<String, Contract> {
        let result = self.public_get::<Vec<BitmexInstrument>>(INSTRUMENTS_ACTIVE, &[]).await;

        let mut contracts = HashMap::new();
        let Some(instruments) = log_and_discard(Self::EXCHANGE, HttpMethod::Get, INSTRUMENTS_ACTIVE, result) else {
            return contracts;
        };

        for raw in &instruments {
            match self.adapter.parse_contract(raw) {
                Ok(contract) => {
                    contracts.insert(contract.symbol.clone(), contract);
                }
                Err(e) => debug!(exchange = Self::EXCHANGE, "Skipping instrument: {}", e),
            }
        }
        contracts
    }

    async fn get_balances(&self) -> HashMap<String, Balance> {
        let result = async {
            let margins: Vec<BitmexMargin> = self
                .signed_request(HttpMethod::Get, MARGIN, &[("currency", "all".to_string())])
                .await?;

            margins
                .iter()
                .map(|raw| Ok((raw.currency.clone(), self.adapter.parse_balance(raw)?)))
                .collect::<Result<HashMap<_, _>>>()
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, MARGIN, result).unwrap_or_default()
    }

    async fn get_historical_candles(&self, contract: &Contract, interval: &str) -> Vec<Candle> {
        let params = [
            ("symbol", contract.symbol.clone()),
            ("partial", "true".to_string()),
            ("binSize", interval.to_string()),
            ("count", BUCKET_COUNT.to_string()),
            ("reverse", "true".to_string()),
        ];
        let result = self.public_get::<Vec<BitmexBucket>>(TRADE_BUCKETED, &params).await;

        let Some(buckets) = log_and_discard(Self::EXCHANGE, HttpMethod::Get, TRADE_BUCKETED, result) else {
            return Vec::new();
        };

        // Newest first on the wire
        buckets
            .iter()
            .rev()
            .filter_map(|raw| match self.adapter.parse_candle(raw, interval) {
                Ok(candle) => Some(candle),
                Err(e) => {
                    debug!(exchange = Self::EXCHANGE, "Skipping bucket {}: {}", raw.timestamp, e);
                    None
                }
            })
            .collect()
    }

    async fn get_book_ticker(&self, contract: &Contract) -> Option<BidAsk> {
        let result = async {
            let rows: Vec<BitmexInstrument> = self
                .public_get(INSTRUMENT, &[("symbol", contract.symbol.clone())])
                .await?;

            let row = rows.into_iter().next().ok_or_else(|| {
                ExchangeError::InvalidResponse(format!("No instrument row for {}", contract.symbol))
            })?;
            Ok::<_, ExchangeError>(BidAsk {
                bid: row.bid_price,
                ask: row.ask_price,
            })
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, INSTRUMENT, result)
    }

    async fn place_order(&self, contract: &Contract, order: &OrderRequest) -> Option<OrderStatus> {
        let result = async {
            let mut params = vec![
                ("symbol", contract.symbol.clone()),
                ("side", order.side.clone()),
                ("orderQty", contract.wire_quantity(order.quantity)?),
                ("ordType", order.order_type.clone()),
            ];
            if let Some(price) = order.price {
                params.push(("price", contract.wire_price(price)?));
            }
            if let Some(tif) = &order.time_in_force {
                params.push(("timeInForce", tif.clone()));
            }

            let raw: BitmexOrder = self.signed_request(HttpMethod::Post, ORDER, &params).await?;
            self.adapter.parse_order_status(&raw)
        }
        .await;

        let status = log_and_discard(Self::EXCHANGE, HttpMethod::Post, ORDER, result)?;
        log_order!(Self::EXCHANGE, "PLACED", status.order_id, contract.symbol);
        Some(status)
    }

    /// The cancel endpoint is keyed by order id alone; BitMEX answers with a list
    async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let result = async {
            let cancelled: Vec<BitmexOrder> = self
                .signed_request(HttpMethod::Delete, ORDER, &[("orderID", order_id.to_string())])
                .await?;

            let raw = cancelled
                .first()
                .ok_or_else(|| ExchangeError::InvalidResponse(format!("Cancel of {order_id} returned no orders")))?;
            self.adapter.parse_order_status(raw)
        }
        .await;

        let status = log_and_discard(Self::EXCHANGE, HttpMethod::Delete, ORDER, result)?;
        log_order!(Self::EXCHANGE, "CANCELLED", status.order_id, contract.symbol);
        Some(status)
    }

    /// Scans one page of the symbol's orders, newest first. Older orders
    /// beyond that page are not found.
    async fn get_order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let result = async {
            let params = [
                ("symbol", contract.symbol.clone()),
                ("reverse", "true".to_string()),
            ];
            let orders: Vec<BitmexOrder> = self.signed_request(HttpMethod::Get, ORDER, &params).await?;

            let raw = orders
                .iter()
                .find(|order| order.order_id == order_id)
                .ok_or_else(|| ExchangeError::InvalidResponse(format!("Order {order_id} not found")))?;
            self.adapter.parse_order_status(raw)
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, ORDER, result)
    }
}
