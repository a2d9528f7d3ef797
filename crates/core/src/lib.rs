//! # PerpBridge Core
//!
//! Runtime and numeric primitives shared by the PerpBridge exchange connectors.
//!
//! ## Building blocks
//!
//! 1. **monoio runtime threads** - Background work gets its own thread and runtime
//! 2. **CPU binding** - Optional pinning for the streaming thread
//! 3. **Millisecond/second clocks** - What exchange signatures and candles need
//! 4. **Decimal-exact precision** - Tick/lot rounding without float drift
//! 5. **Sequence and nonce ids** - Request ids and handshake nonces
//! 6. **Logging bootstrap** - tracing (or ftlog) for binaries and demos

pub mod runtime;
pub mod timing;
pub mod precision;
pub mod logging;
pub mod id_gen;
pub mod cpu;

// Re-export commonly used items
pub use runtime::{spawn_runtime_thread, RuntimeConfig};
pub use timing::{millis, nanos, secs, PerfTimer, Timestamp};
pub use precision::{decimals_in, format_with_decimals, increment_from_decimals, round_to_increment};
pub use logging::init_logging;
pub use id_gen::{generate_nonce, SequenceGen};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::runtime::{block_on, spawn_runtime_thread, RuntimeConfig};
    pub use crate::timing::{millis, nanos, secs, PerfTimer, Timestamp};
    pub use crate::precision::{
        decimals_in, format_with_decimals, increment_from_decimals, round_to_increment,
    };
    pub use crate::id_gen::{generate_nonce, SequenceGen};
    pub use crate::logging::init_logging;
    pub use crate::cpu::{bind_to_cpu_set, get_cpu_count};

    // Common external types
    pub use monoio;
    pub use serde::{Deserialize, Serialize};
    pub use chrono::{DateTime, Utc};
}
