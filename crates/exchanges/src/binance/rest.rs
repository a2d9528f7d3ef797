//! Binance USDⓈ-M futures REST client
//!
//! Reads (exchange info, book ticker, klines) are public; account and order
//! endpoints are signed. Every parameter travels in the URL query.

use super::auth::BinanceSigner;
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
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const EXCHANGE_INFO: &str = "/fapi/v1/exchangeInfo";
const BOOK_TICKER: &str = "/fapi/v1/ticker/bookTicker";
const ACCOUNT: &str = "/fapi/v2/account";
const KLINES: &str = "/fapi/v1/klines";
const ORDER: &str = "/fapi/v1/order";

/// Klines returned per call; there is no paging
pub const KLINE_LIMIT: u32 = 1000;

/// Binance futures REST client
pub struct BinanceRestClient {
    base_url: Url,
    http: HttpClient,
    signer: Option<BinanceSigner>,
    adapter: BinanceAdapter,
}

impl BinanceRestClient {
    fn endpoint_url(&self, endpoint: &str, query: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(endpoint);
        if !query.is_empty() {
            url.set_query(Some(query));
        }
        url
    }

    async fn public_get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint_url(endpoint, &encode_query(params.iter().map(|(k, v)| (*k, v))));

        let body = self
            .http
            .request(HttpMethod::Get, &url, &[])
            .await?
            .into_ok_body()?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: BTreeMap<&str, String>,
    ) -> Result<T> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ExchangeError::MissingCredentials("Binance API key and secret".to_string()))?;

        let url = self.endpoint_url(endpoint, &signer.sign_query(params)?);
        debug!(exchange = Self::EXCHANGE, "📡 {} {} (signed)", method, endpoint);

        let body = self
            .http
            .request(method, &url, &signer.headers())
            .await?
            .into_ok_body()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn order_params(contract: &Contract, order_id: &str) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("symbol", contract.symbol.clone());
        params.insert("orderId", order_id.to_string());
        params
    }
}

#[async_trait(?Send)]
impl RestApi for BinanceRestClient {
    const EXCHANGE: &'static str = "binance";

    fn default_config(testnet: bool) -> ExchangeConfig {
        ExchangeConfig::binance(testnet)
    }

    fn new(config: &ExchangeConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let signer = if config.has_credentials() {
            Some(BinanceSigner::new(Credentials::new(&config.api_key, &config.api_secret))?)
        } else {
            None
        };

        info!(exchange = Self::EXCHANGE, "🔗 Binance REST client created for {}", base_url);

        Ok(Self {
            base_url,
            http: HttpClient::new(Duration::from_millis(config.timeout_ms)),
            signer,
            adapter: BinanceAdapter,
        })
    }

    async fn get_contracts(&self) -> HashMap<String, Contract> {
        let result = self.public_get::<BinanceExchangeInfo>(EXCHANGE_INFO, &[]).await;

        let mut contracts = HashMap::new();
        let Some(info) = log_and_discard(Self::EXCHANGE, HttpMethod::Get, EXCHANGE_INFO, result) else {
            return contracts;
        };

        for raw in &info.symbols {
            match self.adapter.parse_contract(raw) {
                Ok(contract) => {
                    contracts.insert(contract.symbol.clone(), contract);
                }
                Err(e) => debug!(exchange = Self::EXCHANGE, "Skipping contract {}: {}", raw.symbol, e),
            }
        }
        contracts
    }

    async fn get_balances(&self) -> HashMap<String, Balance> {
        let result = async {
            let account: BinanceAccount = self
                .signed_request(HttpMethod::Get, ACCOUNT, BTreeMap::new())
                .await?;

            account
                .assets
                .iter()
                .map(|raw| Ok((raw.asset.clone(), self.adapter.parse_balance(raw)?)))
                .collect::<Result<HashMap<_, _>>>()
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, ACCOUNT, result).unwrap_or_default()
    }

    async fn get_historical_candles(&self, contract: &Contract, interval: &str) -> Vec<Candle> {
        let params = [
            ("symbol", contract.symbol.clone()),
            ("interval", interval.to_string()),
            ("limit", KLINE_LIMIT.to_string()),
        ];
        let result = self.public_get::<Vec<BinanceKline>>(KLINES, &params).await;

        let Some(raw_candles) = log_and_discard(Self::EXCHANGE, HttpMethod::Get, KLINES, result) else {
            return Vec::new();
        };

        raw_candles
            .iter()
            .filter_map(|raw| match self.adapter.parse_candle(raw, interval) {
                Ok(candle) => Some(candle),
                Err(e) => {
                    debug!(exchange = Self::EXCHANGE, "Skipping kline: {}", e);
                    None
                }
            })
            .collect()
    }

    async fn get_book_ticker(&self, contract: &Contract) -> Option<BidAsk> {
        let result = async {
            let ticker: BinanceBookTicker = self
                .public_get(BOOK_TICKER, &[("symbol", contract.symbol.clone())])
                .await?;

            Ok::<_, ExchangeError>(BidAsk {
                bid: Some(parse_f64(&ticker.bid_price, "bidPrice")?),
                ask: Some(parse_f64(&ticker.ask_price, "askPrice")?),
            })
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, BOOK_TICKER, result)
    }

    async fn place_order(&self, contract: &Contract, order: &OrderRequest) -> Option<OrderStatus> {
        let result = async {
            let mut params = BTreeMap::new();
            params.insert("symbol", contract.symbol.clone());
            params.insert("side", order.side.clone());
            params.insert("quantity", contract.wire_quantity(order.quantity)?);
            params.insert("type", order.order_type.clone());
            if let Some(price) = order.price {
                params.insert("price", contract.wire_price(price)?);
            }
            if let Some(tif) = &order.time_in_force {
                params.insert("timeInForce", tif.clone());
            }

            let raw: BinanceOrder = self.signed_request(HttpMethod::Post, ORDER, params).await?;
            self.adapter.parse_order_status(&raw)
        }
        .await;

        let status = log_and_discard(Self::EXCHANGE, HttpMethod::Post, ORDER, result)?;
        log_order!(Self::EXCHANGE, "PLACED", status.order_id, contract.symbol);
        Some(status)
    }

    async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let result = async {
            let raw: BinanceOrder = self
                .signed_request(HttpMethod::Delete, ORDER, Self::order_params(contract, order_id))
                .await?;
            self.adapter.parse_order_status(&raw)
        }
        .await;

        let status = log_and_discard(Self::EXCHANGE, HttpMethod::Delete, ORDER, result)?;
        log_order!(Self::EXCHANGE, "CANCELLED", status.order_id, contract.symbol);
        Some(status)
    }

    async fn get_order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        let result = async {
            let raw: BinanceOrder = self
                .signed_request(HttpMethod::Get, ORDER, Self::order_params(contract, order_id))
                .await?;
            self.adapter.parse_order_status(&raw)
        }
        .await;

        log_and_discard(Self::EXCHANGE, HttpMethod::Get, ORDER, result)
    }
}
