//! Monoio-native WebSocket client (RFC 6455)
//!
//! Masked client frames, automatic pong, fragmented message reassembly and
//! the close handshake, over plain TCP (`ws`) or TLS (`wss`).

use crate::errors::{ExchangeError, Result};
use crate::http::{find_subsequence, host_header, request_target, MaybeTlsStream};
use perpbridge_core::{generate_nonce, nanos, PerfTimer};

use base64::Engine;
use rustls::ClientConfig;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tracing::debug;
use url::Url;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// WebSocket opcode constants
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xa => Some(OpCode::Pong),
            _ => None,
        }
    }
}

/// WebSocket frame header
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
}

/// WebSocket frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Final frame with an explicit mask (`None` for server-side frames)
    pub fn new(opcode: OpCode, payload: Vec<u8>, mask: Option<[u8; 4]>) -> Self {
        Self {
            header: FrameHeader {
                fin: true,
                opcode,
                mask,
                payload_len: payload.len() as u64,
            },
            payload,
        }
    }

    /// Masked client text frame
    pub fn text(data: String) -> Self {
        Self::new(OpCode::Text, data.into_bytes(), Some(Self::generate_mask()))
    }

    /// Masked client ping frame
    pub fn ping(data: Vec<u8>) -> Self {
        Self::new(OpCode::Ping, data, Some(Self::generate_mask()))
    }

    /// Masked client pong frame
    pub fn pong(data: Vec<u8>) -> Self {
        Self::new(OpCode::Pong, data, Some(Self::generate_mask()))
    }

    /// Masked client close frame
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload, Some(Self::generate_mask()))
    }

    fn generate_mask() -> [u8; 4] {
        let t = nanos();
        let mixed = (t ^ (t >> 29)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let bytes = (mixed >> 32) as u32;
        bytes.to_be_bytes()
    }

    fn apply_mask(payload: &mut [u8], mask: &[u8; 4]) {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    /// Status code of a close frame, if it carries one
    pub fn close_code(&self) -> Option<u16> {
        match (self.header.opcode, self.payload.as_slice()) {
            (OpCode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Serialize frame to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.payload.len() + 14);

        let first_byte = if self.header.fin { 0x80 } else { 0x00 } | (self.header.opcode as u8);
        frame.push(first_byte);

        let mask_bit = if self.header.mask.is_some() { 0x80 } else { 0x00 };
        let len = self.payload.len() as u64;
        if len < 126 {
            frame.push(mask_bit | (len as u8));
        } else if len < 65536 {
            frame.push(mask_bit | 126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            frame.push(mask_bit | 127);
            frame.extend_from_slice(&len.to_be_bytes());
        }

        let mut payload = self.payload.clone();
        if let Some(mask) = &self.header.mask {
            frame.extend_from_slice(mask);
            Self::apply_mask(&mut payload, mask);
        }
        frame.extend_from_slice(&payload);

        frame
    }

    /// Parse one frame from the front of `data`.
    ///
    /// `Ok(None)` means the buffer does not hold a whole frame yet. On success
    /// returns the frame (unmasked) and the number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.len() < 2 {
            return Ok(None);
        }

        let fin = (data[0] & 0x80) != 0;
        let opcode = OpCode::from_u8(data[0] & 0x0f).ok_or_else(|| {
            ExchangeError::InvalidResponse(format!("Invalid WebSocket opcode: {:#x}", data[0] & 0x0f))
        })?;

        let masked = (data[1] & 0x80) != 0;
        let mut offset = 2;
        let payload_len = match data[1] & 0x7f {
            126 => {
                if data.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([data[2], data[3]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if data.len() < offset + 8 {
                    return Ok(None);
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&data[2..10]);
                offset += 8;
                u64::from_be_bytes(len_bytes)
            }
            len => len as u64,
        };

        let mask = if masked {
            if data.len() < offset + 4 {
                return Ok(None);
            }
            let mask = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
            offset += 4;
            Some(mask)
        } else {
            None
        };

        let payload_len_usize = usize::try_from(payload_len)
            .map_err(|_| ExchangeError::InvalidResponse("WebSocket frame too large".to_string()))?;
        let end = offset
            .checked_add(payload_len_usize)
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("WebSocket frame length {payload_len} overflows")))?;
        if data.len() < end {
            return Ok(None);
        }

        let mut payload = data[offset..end].to_vec();
        if let Some(mask) = &mask {
            Self::apply_mask(&mut payload, mask);
        }

        Ok(Some((
            Frame {
                header: FrameHeader {
                    fin,
                    opcode,
                    mask,
                    payload_len,
                },
                payload,
            },
            end,
        )))
    }
}

/// A complete application message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    /// Answer to one of our pings
    Pong(Vec<u8>),
    /// Peer closed, with its status code if it sent one
    Close(Option<u16>),
}

/// `Sec-WebSocket-Accept` value for a handshake key
pub fn accept_key(ws_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(ws_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Monoio-native WebSocket client
pub struct WebSocket {
    stream: MaybeTlsStream,
    connected: bool,
    close_sent: bool,
    buffer: Vec<u8>,
    fragments: Option<(OpCode, Vec<u8>)>,
}

impl WebSocket {
    /// Open a `ws://` or `wss://` connection and perform the upgrade
    pub async fn connect(url: &Url, tls_config: &Arc<ClientConfig>) -> Result<Self> {
        let timer = PerfTimer::start("websocket_connect");

        let stream = MaybeTlsStream::connect(url, tls_config).await?;
        let mut websocket = Self {
            stream,
            connected: false,
            close_sent: false,
            buffer: Vec::with_capacity(8192),
            fragments: None,
        };
        websocket.perform_handshake(url).await?;

        timer.log_elapsed();
        Ok(websocket)
    }

    async fn perform_handshake(&mut self, url: &Url) -> Result<()> {
        let ws_key = base64::engine::general_purpose::STANDARD.encode(generate_nonce().as_bytes());
        let target = request_target(url);
        let host = host_header(url)?;

        let handshake_request = format!(
            "GET {target} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {ws_key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );
        self.stream.write_all(handshake_request.as_bytes()).await?;

        // Frames may arrive in the same read as the 101 response
        let header_end = loop {
            if let Some(pos) = find_subsequence(&self.buffer, b"\r\n\r\n") {
                break pos;
            }
            let chunk = self.stream.read_chunk().await?;
            if chunk.is_empty() {
                return Err(ExchangeError::ConnectionFailed(
                    "Connection closed during WebSocket handshake".to_string(),
                ));
            }
            self.buffer.extend_from_slice(&chunk);
        };

        let response = String::from_utf8_lossy(&self.buffer[..header_end]).into_owned();
        self.buffer.drain(..header_end + 4);
        debug!("Received handshake response: {}", response);

        validate_handshake_response(&response, &ws_key)?;
        self.connected = true;
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if !self.connected || self.close_sent {
            return Err(ExchangeError::ConnectionFailed("WebSocket not connected".to_string()));
        }

        self.stream.write_all(&frame.to_bytes()).await?;
        if frame.header.opcode == OpCode::Close {
            self.close_sent = true;
        }
        Ok(())
    }

    /// Send text message
    pub async fn send_text(&mut self, message: String) -> Result<()> {
        self.send_frame(Frame::text(message)).await
    }

    /// Send a ping frame; the answer comes back from `receive` as `Message::Pong`
    pub async fn ping(&mut self, payload: Vec<u8>) -> Result<()> {
        self.send_frame(Frame::ping(payload)).await
    }

    /// Next whole message. Pings are answered internally.
    pub async fn receive(&mut self) -> Result<Message> {
        loop {
            if !self.connected {
                return Err(ExchangeError::ConnectionFailed("WebSocket not connected".to_string()));
            }

            let Some((frame, consumed)) = Frame::from_bytes(&self.buffer)? else {
                let chunk = self.stream.read_chunk().await?;
                if chunk.is_empty() {
                    self.connected = false;
                    return Err(ExchangeError::ConnectionFailed(
                        "WebSocket connection closed by peer".to_string(),
                    ));
                }
                self.buffer.extend_from_slice(&chunk);
                continue;
            };
            self.buffer.drain(..consumed);

            match frame.header.opcode {
                OpCode::Ping => {
                    debug!("Received ping, sending pong");
                    self.send_frame(Frame::pong(frame.payload)).await?;
                }
                OpCode::Pong => return Ok(Message::Pong(frame.payload)),
                OpCode::Close => {
                    let code = frame.close_code();
                    if !self.close_sent {
                        let _ = self.send_frame(Frame::close(1000, "")).await;
                    }
                    self.connected = false;
                    return Ok(Message::Close(code));
                }
                OpCode::Text | OpCode::Binary if frame.header.fin => {
                    return into_message(frame.header.opcode, frame.payload);
                }
                OpCode::Text | OpCode::Binary => {
                    self.fragments = Some((frame.header.opcode, frame.payload));
                }
                OpCode::Continuation => {
                    let Some((_, ref mut data)) = self.fragments else {
                        return Err(ExchangeError::InvalidResponse(
                            "Continuation frame without a message start".to_string(),
                        ));
                    };
                    data.extend_from_slice(&frame.payload);
                    if frame.header.fin {
                        if let Some((opcode, data)) = self.fragments.take() {
                            return into_message(opcode, data);
                        }
                    }
                }
            }
        }
    }

    /// Send a close frame. Best effort: the peer's reply is not awaited.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if !self.connected || self.close_sent {
            return Ok(());
        }
        self.send_frame(Frame::close(code, reason)).await?;
        self.connected = false;
        Ok(())
    }
}

fn into_message(opcode: OpCode, payload: Vec<u8>) -> Result<Message> {
    match opcode {
        OpCode::Text => String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|e| ExchangeError::InvalidResponse(format!("Invalid UTF-8 in text frame: {e}"))),
        _ => Ok(Message::Binary(payload)),
    }
}

fn validate_handshake_response(response: &str, ws_key: &str) -> Result<()> {
    let status_ok = response
        .lines()
        .next()
        .map(|line| line.split_whitespace().nth(1) == Some("101"))
        .unwrap_or(false);
    if !status_ok {
        return Err(ExchangeError::ConnectionFailed(format!(
            "WebSocket handshake failed: {}",
            response.lines().next().unwrap_or("empty response")
        )));
    }

    let expected = accept_key(ws_key);
    let accepted = response.lines().any(|line| {
        line.split_once(':')
            .map(|(key, value)| {
                key.trim().eq_ignore_ascii_case("sec-websocket-accept") && value.trim() == expected
            })
            .unwrap_or(false)
    });
    if !accepted {
        return Err(ExchangeError::ConnectionFailed(
            "WebSocket handshake failed: invalid accept key".to_string(),
        ));
    }

    Ok(())
}
