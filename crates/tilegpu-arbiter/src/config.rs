use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Arbitration service settings.
///
/// Every field has a default, so a configuration file only needs to name what it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArbiterConfig {
    /// Gate the GPU power domain after `idle_timeout_ms` without a lock holder.
    pub power_gating: bool,
    pub idle_timeout_ms: u64,
    /// Bound on the interrupt-driven pipeline flush.
    pub flush_timeout_ms: u64,
    /// Bound on the cache flush/invalidate poll.
    pub cache_flush_timeout_ms: u64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            power_gating: true,
            idle_timeout_ms: 10_000,
            flush_timeout_ms: 1_000,
            cache_flush_timeout_ms: 100,
        }
    }
}

impl ArbiterConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn cache_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_flush_timeout_ms)
    }
}
