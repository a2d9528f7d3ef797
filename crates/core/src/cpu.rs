//! CPU binding for runtime threads

#[cfg(not(feature = "cpu-binding"))]
use tracing::warn;

/// Bind the current thread to one CPU core
pub fn bind_to_cpu_set(cpu_core: usize) -> Result<(), String> {
    #[cfg(feature = "cpu-binding")]
    {
        let core_ids = core_affinity::get_core_ids()
            .ok_or_else(|| "Failed to get CPU core IDs".to_string())?;

        let core_id = core_ids.get(cpu_core).copied().ok_or_else(|| {
            format!(
                "CPU core {} not available ({} cores)",
                cpu_core,
                core_ids.len()
            )
        })?;

        if core_affinity::set_for_current(core_id) {
            Ok(())
        } else {
            Err(format!("Failed to bind to CPU core {cpu_core}"))
        }
    }

    #[cfg(not(feature = "cpu-binding"))]
    {
        warn!("CPU binding disabled, ignoring core {}", cpu_core);
        Ok(())
    }
}

/// Number of CPU cores available for binding
pub fn get_cpu_count() -> usize {
    #[cfg(feature = "cpu-binding")]
    {
        core_affinity::get_core_ids()
            .map(|cores| cores.len())
            .unwrap_or_else(num_cpus::get)
    }

    #[cfg(not(feature = "cpu-binding"))]
    {
        num_cpus::get()
    }
}
