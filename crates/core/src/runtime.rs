//! monoio runtime helpers
//!
//! monoio runtimes are thread-local: a future built on one thread stays on it.
//! Background work such as a market-data stream therefore gets its own OS
//! thread with its own runtime, optionally pinned to a CPU core.

use monoio::{FusionDriver, RuntimeBuilder};
use std::future::Future;
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::cpu::bind_to_cpu_set;

/// Configuration for a dedicated runtime thread
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// CPU core to bind to (None for no binding)
    pub cpu_core: Option<usize>,
    /// Thread name
    pub thread_name: String,
    /// Runtime thread stack size
    pub stack_size: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cpu_core: None,
            thread_name: "perpbridge-rt".to_string(),
            stack_size: Some(2 * 1024 * 1024), // 2MB stack
        }
    }
}

impl RuntimeConfig {
    /// Config with a thread name and optional core binding
    pub fn named(thread_name: impl Into<String>, cpu_core: Option<usize>) -> Self {
        Self {
            cpu_core,
            thread_name: thread_name.into(),
            ..Default::default()
        }
    }
}

/// Run a future to completion on a fresh timer-enabled runtime
/// on the current thread.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: Future,
{
    let mut runtime = RuntimeBuilder::<FusionDriver>::new().enable_timer().build()?;
    Ok(runtime.block_on(future))
}

/// Spawn an OS thread that owns a monoio runtime and drives `f()` on it.
///
/// The returned handle yields the future's output, or the error from
/// building the runtime inside the thread.
pub fn spawn_runtime_thread<F, Fut>(
    config: RuntimeConfig,
    f: F,
) -> io::Result<JoinHandle<io::Result<Fut::Output>>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future,
    Fut::Output: Send + 'static,
{
    let mut builder = thread::Builder::new().name(config.thread_name.clone());
    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    builder.spawn(move || {
        if let Some(cpu_core) = config.cpu_core {
            match bind_to_cpu_set(cpu_core) {
                Ok(()) => info!("🔗 {} bound to CPU core {}", config.thread_name, cpu_core),
                Err(e) => warn!("Failed to bind {} to CPU core {}: {}", config.thread_name, cpu_core, e),
            }
        }

        info!("▶️  Runtime thread {} started", config.thread_name);
        let output = block_on(f());
        info!("⏹️  Runtime thread {} stopped", config.thread_name);
        output
    })
}
