//! Per-exchange client facade
//!
//! Combines one REST client, one background price stream and the caches fed
//! by both. REST calls run on the caller's task; the stream owns its thread.

use crate::cache::PriceCache;
use crate::config::ExchangeConfig;
use crate::errors::Result;
use crate::stream::{ConnectionHealth, StreamHandle, StreamingClient};
use crate::traits::{RestApi, StreamProtocol};
use crate::types::*;
use perpbridge_core::prelude::*;

use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{info, warn};

#[cfg(feature = "binance")]
use crate::binance::{BinanceRestClient, BinanceStream};
#[cfg(feature = "bitmex")]
use crate::bitmex::{BitmexRestClient, BitmexStream};

/// Binance USDⓈ-M futures client
#[cfg(feature = "binance")]
pub type BinanceFuturesClient = FuturesClient<BinanceRestClient, BinanceStream>;

/// BitMEX client
#[cfg(feature = "bitmex")]
pub type BitmexFuturesClient = FuturesClient<BitmexRestClient, BitmexStream>;

/// Single entry point for one exchange account
pub struct FuturesClient<R: RestApi, P: StreamProtocol> {
    rest: R,
    contracts: HashMap<String, Contract>,
    balances: HashMap<String, Balance>,
    balances_fetched_at: Option<Timestamp>,
    prices: PriceCache,
    stream: Option<StreamHandle>,
    _protocol: PhantomData<P>,
}

impl<R: RestApi, P: StreamProtocol> FuturesClient<R, P> {
    /// Fetch contracts and balances, then start the price stream.
    ///
    /// A failed fetch leaves the corresponding map empty rather than failing
    /// construction. Errors only come from invalid configuration or from
    /// spawning the stream thread.
    pub async fn new(config: ExchangeConfig) -> Result<Self> {
        info!(exchange = R::EXCHANGE, "🚀 Initializing {} client", R::EXCHANGE);
        info!(exchange = R::EXCHANGE, "   Base URL: {}", config.base_url);
        info!(exchange = R::EXCHANGE, "   WebSocket: {}", config.ws_url);
        info!(exchange = R::EXCHANGE, "   Testnet: {}", config.testnet);
        info!(exchange = R::EXCHANGE, "   Symbols: {:?}", config.symbols);

        let rest = R::new(&config)?;
        let contracts = rest.get_contracts().await;

        let (balances, balances_fetched_at) = if config.has_credentials() {
            let balances = rest.get_balances().await;
            let fetched_at = (!balances.is_empty()).then(Timestamp::now);
            (balances, fetched_at)
        } else {
            warn!(exchange = R::EXCHANGE, "⚠️  No API credentials, skipping balances");
            (HashMap::new(), None)
        };

        let prices = PriceCache::new();
        let stream = StreamingClient::new(P::default(), &config, prices.clone())?.spawn(config.cpu_core)?;

        info!(
            exchange = R::EXCHANGE,
            "✅ {} client initialized: {} contracts, {} balances",
            R::EXCHANGE,
            contracts.len(),
            balances.len()
        );

        Ok(Self {
            rest,
            contracts,
            balances,
            balances_fetched_at,
            prices,
            stream: Some(stream),
            _protocol: PhantomData,
        })
    }

    /// Construct from a key pair and the testnet flag alone
    pub async fn with_keys(
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        testnet: bool,
    ) -> Result<Self> {
        Self::new(R::default_config(testnet).with_credentials(public_key, secret_key)).await
    }

    pub fn contracts(&self) -> &HashMap<String, Contract> {
        &self.contracts
    }

    pub fn contract(&self, symbol: &str) -> Option<&Contract> {
        self.contracts.get(symbol)
    }

    /// Replace the whole contract set. An empty (failed) fetch keeps the old set.
    pub async fn refresh_contracts(&mut self) -> &HashMap<String, Contract> {
        let contracts = self.rest.get_contracts().await;
        if contracts.is_empty() {
            warn!(exchange = R::EXCHANGE, "⚠️  Contract refresh returned nothing, keeping {} cached", self.contracts.len());
        } else {
            self.contracts = contracts;
        }
        &self.contracts
    }

    /// Fresh balances snapshot. A non-empty result replaces the cached one
    /// and stamps its fetch time.
    pub async fn get_balances(&mut self) -> HashMap<String, Balance> {
        let balances = self.rest.get_balances().await;
        if !balances.is_empty() {
            self.balances = balances.clone();
            self.balances_fetched_at = Some(Timestamp::now());
        }
        balances
    }

    /// Last successful balances snapshot and when it was fetched
    pub fn cached_balances(&self) -> (&HashMap<String, Balance>, Option<Timestamp>) {
        (&self.balances, self.balances_fetched_at)
    }

    pub async fn get_historical_candles(&self, contract: &Contract, interval: &str) -> Vec<Candle> {
        self.rest.get_historical_candles(contract, interval).await
    }

    pub async fn place_order(&self, contract: &Contract, order: &OrderRequest) -> Option<OrderStatus> {
        self.rest.place_order(contract, order).await
    }

    pub async fn cancel_order(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        self.rest.cancel_order(contract, order_id).await
    }

    pub async fn get_order_status(&self, contract: &Contract, order_id: &str) -> Option<OrderStatus> {
        self.rest.get_order_status(contract, order_id).await
    }

    /// Cached top of book; seeded once from the REST book ticker when the
    /// stream has not produced the symbol yet.
    pub async fn get_bid_ask(&self, contract: &Contract) -> Option<BidAsk> {
        if let Some(prices) = self.prices.get(&contract.symbol) {
            return Some(prices);
        }

        let seed = self.rest.get_book_ticker(contract).await?;
        Some(self.prices.apply(&BookUpdate {
            symbol: contract.symbol.clone(),
            bid: seed.bid,
            ask: seed.ask,
        }))
    }

    pub fn stream_health(&self) -> ConnectionHealth {
        self.stream
            .as_ref()
            .map(StreamHandle::health)
            .unwrap_or_default()
    }

    /// Shared handle to the price cache the stream writes into
    pub fn price_cache(&self) -> PriceCache {
        self.prices.clone()
    }

    /// Stop the stream and join its thread. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.stream.as_mut().filter(|stream| stream.is_running()) {
            stream.shutdown();
            info!(exchange = R::EXCHANGE, "⏹️  {} client shut down", R::EXCHANGE);
        }
    }
}
