//! Monoio-native HTTP/1.1 client
//!
//! - Plaintext (`http`/`ws`) or rustls (`https`/`wss`) over monoio TCP
//! - One connection per request with `Connection: close`
//! - Bodies framed by `Content-Length`, chunked encoding, or EOF
//! - Every request bounded by an explicit timeout

use crate::errors::{ExchangeError, Result};
use perpbridge_core::PerfTimer;

use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const READ_CHUNK: usize = 8192;

/// HTTP verbs used by the exchange APIs.
///
/// Closed on purpose: there is no way to ask for a verb the clients do not
/// implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// rustls config trusting the webpki root set
pub fn default_tls_config() -> Arc<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body of a 200 response; anything else is an `HttpError`
    pub fn into_ok_body(self) -> Result<String> {
        if self.status == 200 {
            Ok(self.body)
        } else {
            Err(ExchangeError::HttpError(self.status, self.body))
        }
    }
}

/// TLS stream wrapper for monoio
pub struct TlsStream {
    stream: TcpStream,
    tls_conn: ClientConnection,
    handshake_complete: bool,
}

impl TlsStream {
    pub fn new(stream: TcpStream, tls_conn: ClientConnection) -> Self {
        Self {
            stream,
            tls_conn,
            handshake_complete: false,
        }
    }

    /// Complete TLS handshake
    pub async fn complete_handshake(&mut self) -> Result<()> {
        if self.handshake_complete {
            return Ok(());
        }

        while self.tls_conn.is_handshaking() {
            self.flush_tls().await?;
            if !self.tls_conn.is_handshaking() {
                break;
            }

            if self.tls_conn.wants_read() {
                if !self.fill().await? {
                    return Err(ExchangeError::NetworkError(
                        "Connection closed during TLS handshake".to_string(),
                    ));
                }
            } else if !self.tls_conn.wants_write() {
                return Err(ExchangeError::NetworkError("TLS handshake stalled".to_string()));
            }
        }

        self.flush_tls().await?;
        self.handshake_complete = true;
        Ok(())
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.complete_handshake().await?;

        self.tls_conn
            .writer()
            .write_all(data)
            .map_err(|e| ExchangeError::NetworkError(format!("TLS application write failed: {e}")))?;

        self.flush_tls().await
    }

    /// Next chunk of plaintext. Empty means the peer closed the connection.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        self.complete_handshake().await?;

        let mut plain = vec![0u8; READ_CHUNK];
        loop {
            match self.tls_conn.reader().read(&mut plain) {
                Ok(n) => {
                    plain.truncate(n);
                    return Ok(plain);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                // Peer dropped TCP without close_notify
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(Vec::new()),
                Err(e) => return Err(ExchangeError::NetworkError(format!("TLS read failed: {e}"))),
            }

            if !self.fill().await? {
                return Ok(Vec::new());
            }
            self.flush_tls().await?;
        }
    }

    /// Send any pending TLS records
    async fn flush_tls(&mut self) -> Result<()> {
        while self.tls_conn.wants_write() {
            let mut out = Vec::with_capacity(READ_CHUNK);
            self.tls_conn
                .write_tls(&mut out)
                .map_err(|e| ExchangeError::NetworkError(format!("TLS write failed: {e}")))?;

            if !out.is_empty() {
                let (result, _) = self.stream.write_all(out).await;
                result.map_err(|e| ExchangeError::NetworkError(format!("TCP write failed: {e}")))?;
            }
        }
        Ok(())
    }

    /// Read ciphertext from TCP into the TLS session. `false` on TCP EOF.
    async fn fill(&mut self) -> Result<bool> {
        let (result, buf) = self.stream.read(vec![0u8; READ_CHUNK]).await;
        let bytes_read =
            result.map_err(|e| ExchangeError::NetworkError(format!("TCP read failed: {e}")))?;

        if bytes_read == 0 {
            return Ok(false);
        }

        let mut pending = &buf[..bytes_read];
        while !pending.is_empty() {
            self.tls_conn
                .read_tls(&mut pending)
                .map_err(|e| ExchangeError::NetworkError(format!("TLS read_tls failed: {e}")))?;
            self.tls_conn
                .process_new_packets()
                .map_err(|e| ExchangeError::NetworkError(format!("TLS process failed: {e}")))?;
        }
        Ok(true)
    }
}

/// Plain TCP or TLS, chosen by URL scheme
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl MaybeTlsStream {
    /// Open a connection for an `http`, `https`, `ws` or `wss` URL
    pub async fn connect(url: &Url, tls_config: &Arc<ClientConfig>) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ExchangeError::InvalidUrl(format!("No host in URL: {url}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ExchangeError::InvalidUrl(format!("No port for URL: {url}")))?;

        let tcp_stream = TcpStream::connect(&format!("{host}:{port}"))
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("TCP connect to {host}:{port} failed: {e}")))?;

        match url.scheme() {
            "https" | "wss" => {
                let server_name = ServerName::try_from(host.to_string())
                    .map_err(|e| ExchangeError::NetworkError(format!("Invalid server name: {e}")))?;
                let tls_conn = ClientConnection::new(Arc::clone(tls_config), server_name)
                    .map_err(|e| ExchangeError::NetworkError(format!("TLS setup failed: {e}")))?;

                let mut tls_stream = TlsStream::new(tcp_stream, tls_conn);
                tls_stream.complete_handshake().await?;
                debug!("✅ TLS handshake completed with {}", host);
                Ok(MaybeTlsStream::Tls(Box::new(tls_stream)))
            }
            "http" | "ws" => Ok(MaybeTlsStream::Plain(tcp_stream)),
            other => Err(ExchangeError::InvalidUrl(format!("Unsupported scheme: {other}"))),
        }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            MaybeTlsStream::Plain(stream) => {
                let (result, _) = stream.write_all(data.to_vec()).await;
                result
                    .map(|_| ())
                    .map_err(|e| ExchangeError::NetworkError(format!("TCP write failed: {e}")))
            }
            MaybeTlsStream::Tls(stream) => stream.write_all(data).await,
        }
    }

    /// Next chunk of bytes. Empty means the peer closed the connection.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        match self {
            MaybeTlsStream::Plain(stream) => {
                let (result, mut buf) = stream.read(vec![0u8; READ_CHUNK]).await;
                let bytes_read =
                    result.map_err(|e| ExchangeError::NetworkError(format!("TCP read failed: {e}")))?;
                buf.truncate(bytes_read);
                Ok(buf)
            }
            MaybeTlsStream::Tls(stream) => stream.read_chunk().await,
        }
    }
}

/// Monoio-native HTTP client with a per-request timeout
#[derive(Clone)]
pub struct HttpClient {
    tls_config: Arc<ClientConfig>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_tls_config(default_tls_config(), timeout)
    }

    pub fn with_tls_config(tls_config: Arc<ClientConfig>, timeout: Duration) -> Self {
        Self { tls_config, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue one request. Parameters travel in the URL query; there is never
    /// a request body.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &Url,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        let timer = PerfTimer::start(format!("http_{method}_{}", url.path()));

        let response = monoio::time::timeout(self.timeout, self.send(method, url, headers))
            .await
            .map_err(|_| {
                ExchangeError::Timeout(format!(
                    "{method} {} exceeded {}ms",
                    url.path(),
                    self.timeout.as_millis()
                ))
            })?;

        timer.log_elapsed();
        response
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: &Url,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        let mut stream = MaybeTlsStream::connect(url, &self.tls_config).await?;

        let request = build_request(method, url, headers)?;
        debug!("📡 {} {}", method, url);
        stream.write_all(request.as_bytes()).await?;

        let mut data = Vec::with_capacity(READ_CHUNK);
        loop {
            if let Some(response) = parse_response(&data, false)? {
                return Ok(response);
            }

            let chunk = stream.read_chunk().await?;
            if chunk.is_empty() {
                return parse_response(&data, true)?.ok_or_else(|| {
                    ExchangeError::NetworkError("Connection closed before response completed".to_string())
                });
            }
            data.extend_from_slice(&chunk);
        }
    }
}

/// `path?query` as it goes on the request line
pub(crate) fn request_target(url: &Url) -> String {
    let path = if url.path().is_empty() { "/" } else { url.path() };
    match url.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

/// `Host` header value, with the port when it is not the scheme default
pub(crate) fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ExchangeError::InvalidUrl(format!("No host in URL: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn build_request(method: HttpMethod, url: &Url, headers: &[(&str, String)]) -> Result<String> {
    let target = request_target(url);
    let host = host_header(url)?;

    let mut request = format!(
        "{method} {target} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: PerpBridge/0.1\r\n\
         Accept: application/json\r\n\
         Connection: close\r\n\
         Content-Length: 0\r\n"
    );
    for (key, value) in headers {
        request.push_str(&format!("{key}: {value}\r\n"));
    }
    request.push_str("\r\n");
    Ok(request)
}

pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parse a buffered response. `Ok(None)` means more bytes are needed;
/// with `eof` set, a body without explicit framing runs to the end.
pub fn parse_response(data: &[u8], eof: bool) -> Result<Option<HttpResponse>> {
    let Some(header_end) = find_subsequence(data, b"\r\n\r\n") else {
        if eof && !data.is_empty() {
            return Err(ExchangeError::InvalidResponse(
                "Invalid HTTP response: no header terminator".to_string(),
            ));
        }
        return Ok(None);
    };

    let header_part = String::from_utf8_lossy(&data[..header_end]);
    let body = &data[header_end + 4..];

    let mut lines = header_part.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| ExchangeError::InvalidResponse("Empty response".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ExchangeError::InvalidResponse(format!("Invalid status line: {status_line}")))?;

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };

    let chunked = header("Transfer-Encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    let body = if chunked {
        match decode_chunked(body)? {
            Some(decoded) => decoded,
            None if eof => {
                return Err(ExchangeError::InvalidResponse("Truncated chunked body".to_string()));
            }
            None => return Ok(None),
        }
    } else if let Some(length) = header("Content-Length") {
        let length: usize = length
            .parse()
            .map_err(|_| ExchangeError::InvalidResponse(format!("Invalid Content-Length: {length}")))?;
        if body.len() < length {
            if eof {
                return Err(ExchangeError::InvalidResponse(format!(
                    "Truncated body: {} of {} bytes",
                    body.len(),
                    length
                )));
            }
            return Ok(None);
        }
        body[..length].to_vec()
    } else if eof {
        body.to_vec()
    } else {
        return Ok(None);
    };

    Ok(Some(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
        headers,
    }))
}

/// Decode a chunked body. `Ok(None)` until the terminating zero chunk arrives.
fn decode_chunked(mut data: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut decoded = Vec::new();
    loop {
        let Some(line_end) = find_subsequence(data, b"\r\n") else {
            return Ok(None);
        };
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| ExchangeError::InvalidResponse(format!("Invalid chunk size: {size_hex}")))?;

        if size == 0 {
            return Ok(Some(decoded));
        }

        let chunk_start = line_end + 2;
        let chunk_end = chunk_start
            .checked_add(size)
            .filter(|end| end.checked_add(2).is_some())
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("Chunk size {size_hex} overflows")))?;
        if data.len() < chunk_end + 2 {
            return Ok(None);
        }
        decoded.extend_from_slice(&data[chunk_start..chunk_end]);
        data = &data[chunk_end + 2..];
    }
}
