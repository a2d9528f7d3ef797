//! Test support for the PerpBridge connectors
//!
//! In-process mock HTTP and WebSocket servers on `std::net` (each on its own
//! thread, so the monoio client under test never shares a runtime with
//! them) and a `tracing` layer that counts error events.

use perpbridge_exchanges::websocket::{accept_key, Frame, OpCode};

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READ_TIMEOUT: Duration = Duration::from_millis(20);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

fn bind_local() -> TcpListener {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    listener.set_nonblocking(true).expect("non-blocking listener");
    listener
}

/// Read from `stream` until a blank line ends the HTTP head. Returns the
/// head and whatever followed it.
fn read_http_head(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_string();
            return Some((head, data[end + 4..].to_vec()));
        }
        if Instant::now() >= deadline {
            return None;
        }
        match stream.read(&mut chunk) {
            Ok(0) => return None,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => return None,
        }
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Poll `condition` on a blocking thread until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    condition()
}

/// Poll `condition` from inside a monoio runtime
pub async fn wait_until_async(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        monoio::time::sleep(POLL_INTERVAL).await;
    }
    condition()
}

// ============================================================================
// HTTP
// ============================================================================

/// One request as the mock server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    /// Bytes received after the head
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decoded value of one query parameter
    pub fn param(&self, name: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| {
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string())
            })
        })
    }
}

#[derive(Debug, Clone)]
struct CannedResponse {
    status: u16,
    body: String,
}

/// Builder for [`MockHttpServer`]
#[derive(Default)]
pub struct MockHttpBuilder {
    routes: HashMap<(String, String), CannedResponse>,
}

impl MockHttpBuilder {
    /// Answer `method path` (query ignored) with `status` and a JSON body
    pub fn route(mut self, method: &str, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(
            (method.to_string(), path.to_string()),
            CannedResponse {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn start(self) -> MockHttpServer {
        let listener = bind_local();
        let addr = listener.local_addr().expect("mock http address");
        let stop = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let thread = {
            let stop = Arc::clone(&stop);
            let requests = Arc::clone(&requests);
            let routes = self.routes;
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => serve_http(stream, &routes, &requests),
                        Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                        Err(_) => break,
                    }
                }
            })
        };

        MockHttpServer {
            addr,
            stop,
            requests,
            thread: Some(thread),
        }
    }
}

fn serve_http(
    mut stream: TcpStream,
    routes: &HashMap<(String, String), CannedResponse>,
    requests: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

    let Some((head, body)) = read_http_head(&mut stream) else {
        return;
    };

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let headers = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let response = routes
        .get(&(method.clone(), path.to_string()))
        .cloned()
        .unwrap_or(CannedResponse {
            status: 404,
            body: r#"{"error":"no route"}"#.to_string(),
        });

    requests.lock().unwrap().push(RecordedRequest {
        method,
        path: path.to_string(),
        query: query.to_string(),
        headers,
        body,
    });

    let reply = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(reply.as_bytes());
    let _ = stream.flush();
}

/// REST endpoint double with canned responses per `(method, path)`
pub struct MockHttpServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    thread: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    pub fn builder() -> MockHttpBuilder {
        MockHttpBuilder::default()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests seen for `method path`
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn hits(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).len()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ============================================================================
// WebSocket
// ============================================================================

/// What the peer got from the client while waiting
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Idle,
    Closed,
}

/// Server side of one accepted WebSocket connection
pub struct WsPeer {
    connection: usize,
    stream: TcpStream,
    buffer: Vec<u8>,
    stop: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<(usize, String)>>>,
    pings: Arc<AtomicUsize>,
}

impl WsPeer {
    /// Next client text frame, `Idle` after `timeout`, or `Closed`.
    /// Ping frames are answered with a pong on the way.
    pub fn next_message(&mut self, timeout: Duration) -> Inbound {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 4096];

        loop {
            match Frame::from_bytes(&self.buffer) {
                Ok(Some((frame, used))) => {
                    self.buffer.drain(..used);
                    match frame.header.opcode {
                        OpCode::Text => {
                            let text = String::from_utf8_lossy(&frame.payload).to_string();
                            self.received.lock().unwrap().push((self.connection, text.clone()));
                            return Inbound::Text(text);
                        }
                        OpCode::Close => return Inbound::Closed,
                        OpCode::Ping => {
                            self.pings.fetch_add(1, Ordering::Relaxed);
                            let pong = Frame::new(OpCode::Pong, frame.payload, None);
                            let _ = self.stream.write_all(&pong.to_bytes());
                        }
                        _ => continue,
                    }
                }
                Ok(None) => {}
                Err(_) => return Inbound::Closed,
            }

            if Instant::now() >= deadline || self.stop.load(Ordering::Relaxed) {
                return Inbound::Idle;
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return Inbound::Closed,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(_) => return Inbound::Closed,
            }
        }
    }

    pub fn read_text(&mut self, timeout: Duration) -> Option<String> {
        match self.next_message(timeout) {
            Inbound::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Unmasked server text frame
    pub fn send_text(&mut self, text: &str) {
        let frame = Frame::new(OpCode::Text, text.as_bytes().to_vec(), None);
        let _ = self.stream.write_all(&frame.to_bytes());
    }

    pub fn send_close(&mut self, code: u16) {
        let frame = Frame::new(OpCode::Close, code.to_be_bytes().to_vec(), None);
        let _ = self.stream.write_all(&frame.to_bytes());
    }

    /// Go quiet for `duration`: read nothing, answer nothing, send nothing
    pub fn stall(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline && !self.stop.load(Ordering::Relaxed) {
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Like `hold`, replying to every `request` text with `reply`
    pub fn answer(&mut self, request: &str, reply: &str) {
        while !self.stop.load(Ordering::Relaxed) {
            match self.next_message(Duration::from_millis(50)) {
                Inbound::Closed => return,
                Inbound::Text(text) if text == request => self.send_text(reply),
                _ => {}
            }
        }
    }

    /// Keep the connection open until the client leaves or the server stops
    pub fn hold(&mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            if self.next_message(Duration::from_millis(50)) == Inbound::Closed {
                return;
            }
        }
    }
}

/// Stream endpoint double. Connections are served one at a time by a
/// handler that gets the connection index (from 0) and the peer; returning
/// from the handler drops the socket.
pub struct MockWsServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    opened_at: Arc<Mutex<Vec<Instant>>>,
    received: Arc<Mutex<Vec<(usize, String)>>>,
    pings: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl MockWsServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, &mut WsPeer) + Send + 'static,
    {
        let listener = bind_local();
        let addr = listener.local_addr().expect("mock ws address");
        let stop = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));
        let opened_at = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let pings = Arc::new(AtomicUsize::new(0));

        let thread = {
            let stop = Arc::clone(&stop);
            let connections = Arc::clone(&connections);
            let opened_at = Arc::clone(&opened_at);
            let received = Arc::clone(&received);
            let pings = Arc::clone(&pings);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let Some(mut peer) = accept_ws(stream, &stop, &connections, &received, &pings) else {
                                continue;
                            };
                            opened_at.lock().unwrap().push(Instant::now());
                            handler(peer.connection, &mut peer);
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                        Err(_) => break,
                    }
                }
            })
        };

        Self {
            addr,
            stop,
            connections,
            opened_at,
            received,
            pings,
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Completed handshakes so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// When each completed handshake happened, in connection order
    pub fn opened_at(&self) -> Vec<Instant> {
        self.opened_at.lock().unwrap().clone()
    }

    /// Ping frames answered, across all connections
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }

    /// Every text frame received, tagged with its connection index
    pub fn received(&self) -> Vec<(usize, String)> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn accept_ws(
    mut stream: TcpStream,
    stop: &Arc<AtomicBool>,
    connections: &AtomicUsize,
    received: &Arc<Mutex<Vec<(usize, String)>>>,
    pings: &Arc<AtomicUsize>,
) -> Option<WsPeer> {
    stream.set_nonblocking(false).ok()?;
    stream.set_read_timeout(Some(READ_TIMEOUT)).ok()?;

    let (head, leftover) = read_http_head(&mut stream)?;
    let key = header_value(&head, "Sec-WebSocket-Key")?;

    let reply = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    );
    stream.write_all(reply.as_bytes()).ok()?;

    Some(WsPeer {
        connection: connections.fetch_add(1, Ordering::Relaxed),
        stream,
        buffer: leftover,
        stop: Arc::clone(stop),
        received: Arc::clone(received),
        pings: Arc::clone(pings),
    })
}

// ============================================================================
// Logging
// ============================================================================

/// Layer that records every ERROR event's message
#[derive(Clone, Default)]
pub struct ErrorCounter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriber to install with `tracing::subscriber::set_default`
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        Registry::default().with(self.clone())
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Errors whose message contains `needle`
    pub fn matching(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.messages.lock().unwrap().push(visitor.0);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Canned exchange payloads
pub mod fixtures {
    pub const BINANCE_EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "serverTime": 1633092536099,
        "symbols": [
            {"symbol": "BTCUSDT", "pair": "BTCUSDT", "contractType": "PERPETUAL", "status": "TRADING",
             "baseAsset": "BTC", "quoteAsset": "USDT", "pricePrecision": 2, "quantityPrecision": 3, "filters": []},
            {"symbol": "ETHUSDT", "pair": "ETHUSDT", "contractType": "PERPETUAL", "status": "TRADING",
             "baseAsset": "ETH", "quoteAsset": "USDT", "pricePrecision": 2, "quantityPrecision": 2, "filters": []}
        ]
    }"#;

    pub const BINANCE_ACCOUNT: &str = r#"{
        "assets": [
            {"asset": "USDT", "initialMargin": "10.00", "maintMargin": "1.00", "marginBalance": "1000.50",
             "walletBalance": "990.25", "unrealizedProfit": "10.25"},
            {"asset": "BNB", "initialMargin": "0", "maintMargin": "0", "marginBalance": "0",
             "walletBalance": "0", "unrealizedProfit": "0"}
        ]
    }"#;

    pub const BINANCE_BOOK_TICKER: &str =
        r#"{"symbol":"ETHUSDT","bidPrice":"3000.10","bidQty":"5","askPrice":"3000.20","askQty":"7","time":1633092536099}"#;

    pub const BINANCE_ORDER_NEW: &str =
        r#"{"orderId":4611875134427365377,"symbol":"BTCUSDT","status":"NEW","avgPrice":"0.00000","clientOrderId":"x"}"#;

    pub const BINANCE_KLINES: &str = r#"[
        [1633046400000, "47000.0", "47100.0", "46900.0", "47050.0", "12.5", 1633046459999, "0", 10, "0", "0", "0"],
        [1633046460000, "47050.0", "47200.0", "47000.0", "47150.0", "8.25", 1633046519999, "0", 7, "0", "0", "0"]
    ]"#;

    pub const BITMEX_INSTRUMENTS: &str = r#"[
        {"symbol": "XBTUSD", "rootSymbol": "XBT", "quoteCurrency": "USD", "state": "Open",
         "tickSize": 0.5, "lotSize": 100, "bidPrice": 47000, "askPrice": 47000.5},
        {"symbol": "ETHUSD", "rootSymbol": "ETH", "quoteCurrency": "USD", "state": "Open",
         "tickSize": 0.05, "lotSize": 1, "bidPrice": null, "askPrice": null}
    ]"#;

    pub const BITMEX_MARGIN: &str = r#"[
        {"account": 1, "currency": "XBt", "initMargin": 150000, "maintMargin": 50000,
         "marginBalance": 100000000, "walletBalance": 123456789, "unrealisedPnl": -2500},
        {"account": 1, "currency": "USDt", "initMargin": 0, "maintMargin": 0,
         "marginBalance": 2500000000, "walletBalance": 2500000000, "unrealisedPnl": 0}
    ]"#;

    /// Newest first, as BitMEX sends with `reverse=true`
    pub const BITMEX_BUCKETS: &str = r#"[
        {"timestamp": "2021-10-01T12:10:00.000Z", "symbol": "XBTUSD",
         "open": 47100, "high": 47150, "low": 47050, "close": 47120, "volume": 900},
        {"timestamp": "2021-10-01T12:05:00.000Z", "symbol": "XBTUSD",
         "open": 47000, "high": 47110, "low": 46990, "close": 47100, "volume": 1200}
    ]"#;

    pub const BITMEX_ORDER_NEW: &str =
        r#"{"orderID":"f6ad3e49-1b2c-4a8b-9e1d-2f7c2b1a0e55","symbol":"XBTUSD","ordStatus":"New","avgPx":null}"#;

    pub const BITMEX_ORDERS: &str = r#"[
        {"orderID":"11111111-0000-0000-0000-000000000000","symbol":"XBTUSD","ordStatus":"Filled","avgPx":47012.5},
        {"orderID":"f6ad3e49-1b2c-4a8b-9e1d-2f7c2b1a0e55","symbol":"XBTUSD","ordStatus":"New","avgPx":null}
    ]"#;

    pub const BITMEX_CANCELLED: &str =
        r#"[{"orderID":"f6ad3e49-1b2c-4a8b-9e1d-2f7c2b1a0e55","symbol":"XBTUSD","ordStatus":"Canceled","avgPx":null}]"#;

    /// Binance `bookTicker` stream event
    pub fn binance_book_ticker(symbol: &str, bid: f64, ask: f64) -> String {
        format!(r#"{{"e":"bookTicker","u":1,"s":"{symbol}","b":"{bid}","B":"1","a":"{ask}","A":"1","T":1,"E":1}}"#)
    }
}
