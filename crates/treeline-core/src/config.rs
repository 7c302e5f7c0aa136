//! Engine Configuration
//!
//! All tunables for the four engines in one place. The host constructs
//! a `Config` programmatically; there is no config-file layer.

use std::time::Duration;

/// Configuration for the performance core
#[derive(Debug, Clone)]
pub struct Config {
    /// Extra rows materialized above and below the visible range
    pub buffer_items: usize,
    /// Minimum index delta before a range-changed notification fires
    pub range_change_threshold: usize,
    /// Default row height when no override is recorded (logical px)
    pub default_item_height: f32,

    /// Maximum load requests dispatched per batch
    pub batch_size: usize,
    /// Pending-request queue capacity
    pub queue_capacity: usize,
    /// Automatic retries before a node requires a fresh user request
    pub max_retries: u32,
    /// Background fetch worker threads
    pub fetch_workers: usize,

    /// Render cache entry cap
    pub render_cache_entries: usize,
    /// Render cache entry max age
    pub render_cache_max_age: Duration,

    /// Cache manager byte budget
    pub cache_max_bytes: usize,
    /// Adaptive policy evaluation window (operations)
    pub adaptive_window: usize,
    /// Hit-rate margin required to switch strategies
    pub adaptive_margin: f64,

    /// Memory pool byte budget
    pub memory_budget: usize,
    /// Usage ratio that triggers a cleanup pass
    pub pressure_threshold: f64,
    /// Usage ratio that triggers the aggressive pass
    pub critical_threshold: f64,

    /// Cadence of batch dispatch on the interactive scheduler
    pub dispatch_interval: Duration,
    /// Cadence of memory sampling / cleanup checks
    pub cleanup_interval: Duration,
    /// Cadence of statistics refresh
    pub stats_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_items: 10,
            range_change_threshold: 2,
            default_item_height: 24.0,

            batch_size: 16,
            queue_capacity: 1024,
            max_retries: 3,
            fetch_workers: 2,

            render_cache_entries: 2048,
            render_cache_max_age: Duration::from_secs(60),

            cache_max_bytes: 64 * 1024 * 1024, // 64MB
            adaptive_window: 1000,
            adaptive_margin: 0.05,

            memory_budget: 256 * 1024 * 1024, // 256MB
            pressure_threshold: 0.8,
            critical_threshold: 0.95,

            dispatch_interval: Duration::from_millis(16),
            cleanup_interval: Duration::from_millis(500),
            stats_interval: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Scale the byte budgets from a single total
    pub fn with_total(total_mb: usize) -> Self {
        let total = total_mb * 1024 * 1024;
        Self {
            cache_max_bytes: total / 4,
            memory_budget: total,
            ..Self::default()
        }
    }

    /// Minimal footprint for constrained hosts
    pub fn minimal() -> Self {
        Self {
            buffer_items: 4,
            batch_size: 4,
            queue_capacity: 128,
            fetch_workers: 1,
            render_cache_entries: 256,
            cache_max_bytes: 8 * 1024 * 1024,
            memory_budget: 32 * 1024 * 1024,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_ordered() {
        let config = Config::default();
        assert!(config.pressure_threshold < config.critical_threshold);
        assert!(config.critical_threshold <= 1.0);
    }

    #[test]
    fn test_with_total() {
        let config = Config::with_total(100);
        assert_eq!(config.memory_budget, 100 * 1024 * 1024);
        assert_eq!(config.cache_max_bytes, 25 * 1024 * 1024);
    }
}
