//! Shared top-of-book cache
//!
//! Written by the stream thread, read (and seeded) by REST callers on other
//! threads. One mutex per exchange client; last write wins.

use crate::types::{BidAsk, BookUpdate};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to one exchange's bid/ask map.
///
/// Keys are never removed once inserted.
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    inner: Arc<Mutex<HashMap<String, BidAsk>>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written `BidAsk`.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, BidAsk>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or merge an update; a missing side keeps its previous value.
    /// Returns the entry after the merge.
    pub fn apply(&self, update: &BookUpdate) -> BidAsk {
        let mut prices = self.lock();
        let entry = prices.entry(update.symbol.clone()).or_default();
        if let Some(bid) = update.bid {
            entry.bid = Some(bid);
        }
        if let Some(ask) = update.ask {
            entry.ask = Some(ask);
        }
        *entry
    }

    pub fn get(&self, symbol: &str) -> Option<BidAsk> {
        self.lock().get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.lock().contains_key(symbol)
    }
}
