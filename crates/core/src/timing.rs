//! Wall-clock timestamps and latency timers
//!
//! Exchanges speak two clocks: Binance signs with epoch milliseconds, BitMEX
//! with an epoch-seconds expiry. Both are derived from one nanosecond source.

use std::time::{SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing;

/// Nanosecond timestamp since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Nanoseconds since Unix epoch
    pub nanos: u64,
}

impl Timestamp {
    /// Create a timestamp from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: (millis.max(0) as u64) * 1_000_000,
        }
    }

    /// Create a timestamp from the current time
    pub fn now() -> Self {
        Self {
            nanos: nanos(),
        }
    }

    /// Epoch milliseconds
    pub fn as_millis(&self) -> i64 {
        (self.nanos / 1_000_000) as i64
    }

    /// Convert to chrono DateTime<Utc>
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.nanos / 1_000_000_000;
        let nsecs = (self.nanos % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs as i64, nsecs).unwrap_or_else(Utc::now)
    }

    /// Get elapsed time since this timestamp in nanoseconds
    pub fn elapsed_nanos(&self) -> u64 {
        nanos().saturating_sub(self.nanos)
    }

    /// Get elapsed time since this timestamp in microseconds
    pub fn elapsed_micros(&self) -> u64 {
        self.elapsed_nanos() / 1_000
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        let nanos = dt.timestamp().max(0) as u64 * 1_000_000_000 + dt.timestamp_subsec_nanos() as u64;
        Self { nanos }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Current time in nanoseconds since the Unix epoch
#[inline]
pub fn nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Current time in epoch milliseconds (Binance `timestamp` parameter)
#[inline]
pub fn millis() -> u64 {
    nanos() / 1_000_000
}

/// Current time in epoch seconds (BitMEX `api-expires` base)
#[inline]
pub fn secs() -> u64 {
    nanos() / 1_000_000_000
}

/// Latency measurement for one named operation
pub struct PerfTimer {
    start: Timestamp,
    name: String,
}

impl PerfTimer {
    /// Start a new performance timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Timestamp::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in microseconds
    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed_micros()
    }

    /// Log the elapsed time
    pub fn log_elapsed(&self) {
        let micros = self.elapsed_micros();
        if micros < 1000 {
            tracing::debug!("⏱️  {} took {}μs", self.name, micros);
        } else {
            tracing::debug!("⏱️  {} took {:.3}ms", self.name, micros as f64 / 1000.0);
        }
    }
}
