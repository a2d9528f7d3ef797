//! Self-healing top-of-book stream
//!
//! State machine, looping until shut down:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> (message loop) -> Disconnected
//! ```
//!
//! Any error or close drops back to `Disconnected`, waits a fixed cool-down
//! and tries again, with no retry limit. A quiet connection is kept alive with
//! a ping every heartbeat interval; three silent intervals count as an error. The loop owns a dedicated thread and
//! monoio runtime; a flume channel is its cancellation token, observed at
//! every await point.

use crate::cache::PriceCache;
use crate::config::ExchangeConfig;
use crate::errors::{ExchangeError, Result};
use crate::http::default_tls_config;
use crate::traits::StreamProtocol;
use crate::websocket::{Message, WebSocket};
use perpbridge_core::prelude::*;

use flume::{Receiver, Sender, TryRecvError};
use rustls::ClientConfig;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::dispatcher::Dispatch;
use tracing::subscriber::NoSubscriber;
use tracing::{debug, error, info, warn};
use url::Url;

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    /// Shut down; the loop will not run again
    Stopped,
}

/// Connection health metrics
#[derive(Debug, Clone, Default)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    /// Successful socket opens
    pub connect_count: u64,
    /// Connection attempts after the first
    pub reconnect_count: u64,
    /// Subscribe messages sent, across all connections
    pub subscribe_count: u64,
    /// Book updates applied to the cache
    pub message_count: u64,
    pub error_count: u64,
    /// Connections dropped for staying silent through the heartbeat window
    pub heartbeat_timeouts: u64,
    pub connected_at: Option<Timestamp>,
    pub last_message_at: Option<Timestamp>,
}

impl ConnectionHealth {
    pub fn is_subscribed(&self) -> bool {
        self.state == ConnectionState::Subscribed
    }
}

type SharedHealth = Arc<Mutex<ConnectionHealth>>;

fn read_health(health: &SharedHealth) -> ConnectionHealth {
    health.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Heartbeat intervals without any inbound frame before a connection is dead
const HEARTBEAT_MISSES: u32 = 3;

/// Why one connection ended without an error
enum Exit {
    Shutdown,
    Closed(Option<u16>),
}

enum Event {
    Shutdown,
    /// A heartbeat interval passed with nothing received
    Idle,
    Frame(Result<Message>),
}

/// Streaming client for one exchange protocol
pub struct StreamingClient<P: StreamProtocol> {
    protocol: P,
    url: Url,
    symbols: Vec<String>,
    cache: PriceCache,
    health: SharedHealth,
    ids: SequenceGen,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    heartbeat: Option<Duration>,
    tls_config: Arc<ClientConfig>,
}

impl<P: StreamProtocol> StreamingClient<P> {
    pub fn new(protocol: P, config: &ExchangeConfig, cache: PriceCache) -> Result<Self> {
        let url = Url::parse(&config.ws_url)?;

        Ok(Self {
            protocol,
            url,
            symbols: config.symbols.clone(),
            cache,
            health: Arc::new(Mutex::new(ConnectionHealth::default())),
            ids: SequenceGen::new(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(config.timeout_ms),
            heartbeat: (config.heartbeat_ms > 0).then(|| Duration::from_millis(config.heartbeat_ms)),
            tls_config: default_tls_config(),
        })
    }

    pub fn health(&self) -> ConnectionHealth {
        read_health(&self.health)
    }

    /// Move the client onto its own runtime thread.
    ///
    /// The caller's current `tracing` dispatcher is carried over to the new
    /// thread, so a thread-scoped subscriber still sees stream events.
    pub fn spawn(self, cpu_core: Option<usize>) -> Result<StreamHandle> {
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);
        let health = Arc::clone(&self.health);
        let dispatch = inherited_dispatch();

        let runtime_config = RuntimeConfig::named(format!("{}-stream", P::EXCHANGE), cpu_core);
        let thread = spawn_runtime_thread(runtime_config, move || async move {
            let _log_guard = dispatch.as_ref().map(tracing::dispatcher::set_default);
            self.run(shutdown_rx).await;
        })
        .map_err(|e| ExchangeError::ConnectionFailed(format!("Failed to spawn stream thread: {e}")))?;

        Ok(StreamHandle {
            exchange: P::EXCHANGE,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            health,
        })
    }

    /// Reconnect loop. Returns once `shutdown` fires or all senders are gone.
    pub async fn run(self, shutdown: Receiver<()>) {
        info!(exchange = P::EXCHANGE, "🔗 Starting stream for {:?} at {}", self.symbols, self.url);

        let mut first_attempt = true;
        loop {
            if shutdown_requested(&shutdown) {
                break;
            }
            self.update_health(|h| {
                h.state = ConnectionState::Connecting;
                if !first_attempt {
                    h.reconnect_count += 1;
                }
            });
            first_attempt = false;

            match self.run_connection(&shutdown).await {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Closed(code)) => {
                    warn!(exchange = P::EXCHANGE, "🔌 {} connection closed (code {:?})", P::EXCHANGE, code);
                }
                Err(e) => {
                    error!(exchange = P::EXCHANGE, "❌ {} connection error: {}", P::EXCHANGE, e);
                    self.update_health(|h| h.error_count += 1);
                }
            }
            self.update_health(|h| h.state = ConnectionState::Disconnected);

            debug!(exchange = P::EXCHANGE, "🔄 Reconnecting in {}ms", self.reconnect_delay.as_millis());
            let stop = monoio::select! {
                _ = shutdown.recv_async() => true,
                _ = monoio::time::sleep(self.reconnect_delay) => false,
            };
            if stop {
                break;
            }
        }

        self.update_health(|h| h.state = ConnectionState::Stopped);
        info!(exchange = P::EXCHANGE, "⏹️  {} stream stopped", P::EXCHANGE);
    }

    async fn run_connection(&self, shutdown: &Receiver<()>) -> Result<Exit> {
        let connect = monoio::time::timeout(
            self.connect_timeout,
            WebSocket::connect(&self.url, &self.tls_config),
        );
        let opened = monoio::select! {
            _ = shutdown.recv_async() => None,
            result = connect => Some(result),
        };
        let mut ws = match opened {
            None => return Ok(Exit::Shutdown),
            Some(Ok(result)) => result?,
            Some(Err(_)) => {
                return Err(ExchangeError::Timeout(format!(
                    "connect to {} exceeded {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                )));
            }
        };

        info!(exchange = P::EXCHANGE, "✅ {} connection opened", P::EXCHANGE);
        self.update_health(|h| {
            h.connect_count += 1;
            h.connected_at = Some(Timestamp::now());
        });

        for message in self.protocol.subscribe_messages(&self.symbols, &self.ids) {
            ws.send_text(message.clone())
                .await
                .map_err(|e| ExchangeError::ConnectionFailed(format!("subscribe failed: {e}")))?;
            info!(exchange = P::EXCHANGE, "📊 Subscribed: {}", message);
            self.update_health(|h| h.subscribe_count += 1);
        }
        self.update_health(|h| h.state = ConnectionState::Subscribed);

        let mut last_frame = Instant::now();
        loop {
            let event = monoio::select! {
                _ = shutdown.recv_async() => Event::Shutdown,
                frame = self.next_frame(&mut ws) => frame.map_or(Event::Idle, Event::Frame),
            };

            match event {
                Event::Shutdown => {
                    let _ = ws.close(1000, "client shutdown").await;
                    return Ok(Exit::Shutdown);
                }
                Event::Idle => self.keep_alive(&mut ws, last_frame.elapsed()).await?,
                Event::Frame(frame) => {
                    last_frame = Instant::now();
                    match frame? {
                        Message::Text(text) => self.handle_message(&text),
                        Message::Binary(_) | Message::Pong(_) => {}
                        Message::Close(code) => return Ok(Exit::Closed(code)),
                    }
                }
            }
        }
    }

    /// Next inbound frame, or `None` once a heartbeat interval passes without one
    async fn next_frame(&self, ws: &mut WebSocket) -> Option<Result<Message>> {
        match self.heartbeat {
            Some(interval) => monoio::time::timeout(interval, ws.receive()).await.ok(),
            None => Some(ws.receive().await),
        }
    }

    async fn keep_alive(&self, ws: &mut WebSocket, silent_for: Duration) -> Result<()> {
        let Some(interval) = self.heartbeat else {
            return Ok(());
        };
        if silent_for >= interval * HEARTBEAT_MISSES {
            self.update_health(|h| h.heartbeat_timeouts += 1);
            return Err(ExchangeError::Timeout(format!(
                "no frames for {}ms",
                silent_for.as_millis()
            )));
        }

        debug!(exchange = P::EXCHANGE, "💓 Heartbeat after {}ms idle", silent_for.as_millis());
        match self.protocol.heartbeat_message() {
            Some(text) => ws.send_text(text).await,
            None => ws.ping(Vec::new()).await,
        }
    }

    fn handle_message(&self, text: &str) {
        let mut updates = self.protocol.parse_book_updates(text);
        updates.retain(|update| self.symbols.contains(&update.symbol));
        if updates.is_empty() {
            debug!(exchange = P::EXCHANGE, "Ignoring message: {}", text);
            return;
        }

        for update in &updates {
            let prices = self.cache.apply(update);
            debug!(exchange = P::EXCHANGE, "{} bid={:?} ask={:?}", update.symbol, prices.bid, prices.ask);
        }
        self.update_health(|h| {
            h.message_count += updates.len() as u64;
            h.last_message_at = Some(Timestamp::now());
        });
    }

    fn update_health(&self, f: impl FnOnce(&mut ConnectionHealth)) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut health);
    }
}

/// The caller's dispatcher, unless it is the no-op one. Without it the stream
/// thread falls back to the global default, even one installed later.
fn inherited_dispatch() -> Option<Dispatch> {
    tracing::dispatcher::get_default(|current| (!current.is::<NoSubscriber>()).then(|| current.clone()))
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Owner of a running stream thread. Dropping it stops and joins the thread.
pub struct StreamHandle {
    exchange: &'static str,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<io::Result<()>>>,
    health: SharedHealth,
}

impl StreamHandle {
    pub fn health(&self) -> ConnectionHealth {
        read_health(&self.health)
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop and wait for its thread. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(Ok(())) => debug!(exchange = self.exchange, "Stream thread joined"),
                Ok(Err(e)) => error!(exchange = self.exchange, "❌ Stream runtime failed: {}", e),
                Err(_) => error!(exchange = self.exchange, "❌ Stream thread panicked"),
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
