//! Dispatch engine configuration

use dstpool_core::kprint::LogLevel;
use std::time::Duration;

/// Configuration for a [`crate::Pool`].
///
/// Construct with [`DispatchConfig::from_env`] to pick up `DSTPOOL_*`
/// overrides on top of library defaults, or build one programmatically
/// with the setter methods.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of worker threads the pool starts.
    pub num_workers: usize,

    /// Default `qsize` for queues created without an explicit override.
    pub default_qsize: usize,

    /// How long an idle worker waits on its personal condition variable
    /// before re-scanning the queue ring (spurious wakes are tolerated
    /// either way; this just bounds staleness if a signal is ever missed).
    pub idle_park_timeout: Duration,

    /// Enable debug-level logging via `dstpool_core::kprint`.
    pub debug_logging: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DispatchConfig {
    /// Create a config from compile-time defaults with environment
    /// overrides.
    ///
    /// Environment variables (all optional):
    /// - `DSTPOOL_NUM_WORKERS` - worker thread count
    /// - `DSTPOOL_DEFAULT_QSIZE` - default queue depth
    /// - `DSTPOOL_PARK_TIMEOUT_MS` - idle worker park timeout
    /// - `DSTPOOL_DEBUG` - enable debug logging (0/1)
    pub fn from_env() -> Self {
        use dstpool_core::env::{env_get, env_get_bool};

        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: env_get("DSTPOOL_NUM_WORKERS", num_cpus),
            default_qsize: env_get("DSTPOOL_DEFAULT_QSIZE", 16usize),
            idle_park_timeout: Duration::from_millis(env_get("DSTPOOL_PARK_TIMEOUT_MS", 50u64)),
            debug_logging: env_get_bool("DSTPOOL_DEBUG", false),
        }
    }

    /// Set the worker thread count.
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n.max(1);
        self
    }

    /// Set the default queue depth.
    pub fn default_qsize(mut self, n: usize) -> Self {
        self.default_qsize = n.max(1);
        self
    }

    /// Set the idle worker park timeout.
    pub fn idle_park_timeout(mut self, d: Duration) -> Self {
        self.idle_park_timeout = d;
        self
    }

    /// Enable or disable debug logging.
    ///
    /// Also raises the process-wide `dstpool_core::kprint` log level so
    /// that `kdebug!` output from this pool becomes visible; since the
    /// level is process-global, disabling it here only lowers the level
    /// if nothing else has asked for a more verbose one.
    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        if enable {
            dstpool_core::kprint::set_log_level(LogLevel::Debug);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_picks_up_cpu_count() {
        let cfg = DispatchConfig::default();
        assert!(cfg.num_workers >= 1);
        assert!(cfg.default_qsize >= 1);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = DispatchConfig::from_env()
            .num_workers(3)
            .default_qsize(7)
            .idle_park_timeout(Duration::from_millis(5));
        assert_eq!(cfg.num_workers, 3);
        assert_eq!(cfg.default_qsize, 7);
        assert_eq!(cfg.idle_park_timeout, Duration::from_millis(5));
    }

    #[test]
    fn env_override_takes_effect() {
        std::env::set_var("DSTPOOL_NUM_WORKERS", "9");
        let cfg = DispatchConfig::from_env();
        assert_eq!(cfg.num_workers, 9);
        std::env::remove_var("DSTPOOL_NUM_WORKERS");
    }
}
