//! Request ids and handshake nonces

use nanoid::nanoid;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic request id source
///
/// Each streaming client owns one; ids start at 1 and never repeat within
/// the generator's lifetime.
#[derive(Debug)]
pub struct SequenceGen {
    next: AtomicU64,
}

impl SequenceGen {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Take the next id
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceGen {
    fn default() -> Self {
        Self::new()
    }
}

/// 16-character nonce for websocket handshake keys.
///
/// Sixteen bytes is what RFC 6455 asks for before base64 encoding.
pub fn generate_nonce() -> String {
    nanoid!(16)
}
