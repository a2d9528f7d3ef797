//! Logging bootstrap
//!
//! Library code only emits `tracing` events and never installs a subscriber.
//! Binaries, demos and tests call [`init_logging`] once; `RUST_LOG` controls
//! the filter (default `info`).

#[cfg(not(feature = "ftlog"))]
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use std::sync::Once;

#[doc(hidden)]
pub use tracing;

static INIT: Once = Once::new();

/// Install the process-wide logger. Safe to call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        #[cfg(feature = "ftlog")]
        {
            init_ftlog();
        }

        #[cfg(not(feature = "ftlog"))]
        {
            init_tracing();
        }
    });
}

#[cfg(feature = "ftlog")]
fn init_ftlog() {
    let logger = match ftlog::builder()
        .max_log_level(ftlog::LevelFilter::Debug)
        .bounded(100_000, false)
        .utc()
        .build()
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("ftlog build failed: {e}");
            return;
        }
    };

    match logger.init() {
        // The guard flushes on drop; the logger lives for the whole process.
        Ok(guard) => std::mem::forget(guard),
        Err(e) => eprintln!("ftlog init failed: {e}"),
    }
    tracing::info!("📝 Initialized ftlog logging");
}

#[cfg(not(feature = "ftlog"))]
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    // Another subscriber (e.g. a test harness) may already be installed.
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::info!("📝 Initialized tracing logging");
    }
}

/// Log an order lifecycle event tagged with its exchange
#[macro_export]
macro_rules! log_order {
    ($exchange:expr, $action:expr, $order_id:expr, $symbol:expr) => {
        $crate::logging::tracing::info!(
            exchange = $exchange,
            "📋 ORDER {}: {} ({})", $action, $order_id, $symbol
        );
    };
}

/// Log a failed operation tagged with its exchange
#[macro_export]
macro_rules! log_error {
    ($exchange:expr, $operation:expr, $error:expr) => {
        $crate::logging::tracing::error!(
            exchange = $exchange,
            "❌ {} failed: {}", $operation, $error
        );
    };
}
